/// Key Management Module
///
/// Manages the secp256k1 signing keypair that backs a file owner's
/// `FileSecurity` record (spec.md §3, §4.2): the `P2PKH`/`P2PK` scripts
/// embedded in every shard envelope are derived from this key.
///
/// Keys are stored in a dedicated directory with separate files for the
/// secret key (binary) and metadata (JSON), mirroring how the rest of the
/// crate keeps wire/storage formats apart from human-facing metadata.
use chrono::{DateTime, Local};
use libsecp256k1::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::sha256;
use crate::error::{DfsError, DfsResult};
use crate::models::FileSecurity;

/// Metadata about a signing keypair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyInfo {
    pub name: String,
    pub created: DateTime<Local>,
    pub public_key_hex: String,
}

/// Holds a secret key and its metadata.
#[derive(Debug, Clone)]
pub struct KeyManager {
    pub key: SecretKey,
    pub key_info: SigningKeyInfo,
}

impl KeyManager {
    pub fn new(key: SecretKey, name: String) -> Self {
        let public_key = PublicKey::from_secret_key(&key);
        let key_info = SigningKeyInfo {
            name,
            created: Local::now(),
            public_key_hex: hex::encode(public_key.serialize()),
        };
        Self { key, key_info }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&self.key)
    }

    /// Derives the pubkey-hash used by `P2PKH`-style scripts.
    pub fn pubkey_hash(&self) -> String {
        let digest = sha256(&self.public_key().serialize_compressed());
        hex::encode(&digest[..20])
    }

    /// Builds the `FileSecurity` record for a newly-created file, picking a
    /// fresh per-file encryption secret and splitting it into Shamir shares.
    pub fn build_file_security(&self, shamir_n: u8, shamir_k: u8) -> DfsResult<(FileSecurity, Vec<Vec<u8>>)> {
        let secret = crate::crypto::generate_file_secret();
        let shares = crate::crypto::shamir_split(&secret, shamir_n, shamir_k)?;

        let security = FileSecurity {
            owner_public_key: self.public_key().serialize_compressed().to_vec(),
            p2pkh_script: FileSecurity::build_p2pkh_script(&self.pubkey_hash()),
            p2pk_script: FileSecurity::build_p2pk_script(&hex::encode(self.public_key().serialize_compressed())),
            encryption_secret: Some(secret),
            shamir_n,
            shamir_k,
        };
        Ok((security, shares))
    }

    pub fn save_to_file(&self, keys_dir: &Path) -> DfsResult<()> {
        fs::create_dir_all(keys_dir)?;

        let key_file = keys_dir.join(format!("{}.key", self.key_info.name));
        let info_file = keys_dir.join(format!("{}.info", self.key_info.name));

        fs::write(&key_file, self.key.serialize())?;
        let info_json = serde_json::to_string_pretty(&self.key_info)?;
        fs::write(&info_file, info_json)?;

        tracing::info!("saved signing key {} to {:?}", self.key_info.name, key_file);
        Ok(())
    }

    pub fn load_from_file(keys_dir: &Path, name: &str) -> DfsResult<Self> {
        let key_file = keys_dir.join(format!("{}.key", name));
        let info_file = keys_dir.join(format!("{}.info", name));

        let key_bytes = fs::read(&key_file)?;
        let key = SecretKey::parse_slice(&key_bytes)
            .map_err(|e| DfsError::Crypto(format!("failed to parse secret key: {:?}", e)))?;

        let info_json = fs::read_to_string(&info_file)?;
        let key_info: SigningKeyInfo = serde_json::from_str(&info_json)?;

        Ok(Self { key, key_info })
    }

    pub fn list_keys(keys_dir: &Path) -> DfsResult<Vec<String>> {
        if !keys_dir.exists() {
            return Ok(Vec::new());
        }

        let mut key_names = Vec::new();
        for entry in fs::read_dir(keys_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "key") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if keys_dir.join(format!("{}.info", stem)).exists() {
                        key_names.push(stem.to_string());
                    }
                }
            }
        }
        key_names.sort();
        Ok(key_names)
    }

    /// Loads the named key, or the sole key present, or generates and
    /// persists a new `"default"` key if the directory is empty.
    pub fn load_or_create_default(keys_dir: &Path, name: Option<&str>) -> DfsResult<Self> {
        if let Some(name) = name {
            if keys_dir.join(format!("{}.key", name)).exists() {
                return Self::load_from_file(keys_dir, name);
            }
            let manager = Self::new(SecretKey::random(&mut rand::thread_rng()), name.to_string());
            manager.save_to_file(keys_dir)?;
            return Ok(manager);
        }

        let existing = Self::list_keys(keys_dir)?;
        if let Some(first) = existing.first() {
            return Self::load_from_file(keys_dir, first);
        }

        let manager = Self::new(SecretKey::random(&mut rand::thread_rng()), "default".to_string());
        manager.save_to_file(keys_dir)?;
        Ok(manager)
    }
}

pub fn get_default_keys_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".meshvault").join("keys"))
        .unwrap_or_else(|| PathBuf::from("./keys"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_then_load_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let keys_dir = temp_dir.path();

        let secret_key = SecretKey::random(&mut rand::thread_rng());
        let key_manager = KeyManager::new(secret_key, "test_key".to_string());
        key_manager.save_to_file(keys_dir).unwrap();

        let loaded = KeyManager::load_from_file(keys_dir, "test_key").unwrap();
        assert_eq!(key_manager.key.serialize(), loaded.key.serialize());
        assert_eq!(key_manager.key_info.public_key_hex, loaded.key_info.public_key_hex);
    }

    #[test]
    fn list_keys_finds_all_saved_keys() {
        let temp_dir = TempDir::new().unwrap();
        let keys_dir = temp_dir.path();

        KeyManager::new(SecretKey::random(&mut rand::thread_rng()), "key1".into())
            .save_to_file(keys_dir)
            .unwrap();
        KeyManager::new(SecretKey::random(&mut rand::thread_rng()), "key2".into())
            .save_to_file(keys_dir)
            .unwrap();

        let keys = KeyManager::list_keys(keys_dir).unwrap();
        assert_eq!(keys, vec!["key1".to_string(), "key2".to_string()]);
    }

    #[test]
    fn load_or_create_default_generates_a_key_when_none_exist() {
        let temp_dir = TempDir::new().unwrap();
        let manager = KeyManager::load_or_create_default(temp_dir.path(), None).unwrap();
        assert_eq!(manager.key_info.name, "default");

        let reloaded = KeyManager::load_or_create_default(temp_dir.path(), None).unwrap();
        assert_eq!(manager.key.serialize(), reloaded.key.serialize());
    }

    #[test]
    fn build_file_security_shares_recombine_to_the_same_secret() {
        let manager = KeyManager::new(SecretKey::random(&mut rand::thread_rng()), "owner".into());
        let (security, shares) = manager.build_file_security(3, 2).unwrap();

        let recombined = crate::crypto::shamir_combine(&shares[0..2], 2).unwrap();
        assert_eq!(Some(recombined.try_into().unwrap()), security.encryption_secret);
    }
}
