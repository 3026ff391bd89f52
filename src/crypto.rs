/// Cryptographic primitives: AEAD shard encryption, legacy CTR streaming,
/// gzip compression, ECDSA signing/verification, Shamir secret splitting,
/// and the hash functions used for integrity checking (spec.md §4.2, §4.4).
use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit as AeadKeyInit};
use aes_gcm::{Aes128Gcm, Key as AesGcmKey, Nonce};
use ctr::cipher::{KeyIvInit, StreamCipher};
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use libsecp256k1::{Message, PublicKey, SecretKey, Signature};
use rand::RngCore;
use sharks::{Share, Sharks};
use std::io::Read;

use crate::error::{DfsError, DfsResult};

const GCM_NONCE_LEN: usize = 12;
const LEADING_HASH_LEN: usize = 32;

/// Derives a 16-byte AES-128-GCM key from a file's per-file secret.
///
/// The input secret is a uniformly random 32-byte value minted per file
/// (see [`generate_file_secret`]), not user-supplied low-entropy material,
/// so MD5's weaknesses as a general-purpose hash do not apply here; this
/// mirrors the legacy key-derivation path the format was frozen around.
pub fn derive_gcm_key(file_secret: &[u8]) -> [u8; 16] {
    md5::compute(file_secret).0
}

/// Encrypts `plaintext` with AES-128-GCM, returning `nonce || ciphertext || tag`.
pub fn gcm_encrypt(key: &[u8; 16], plaintext: &[u8]) -> DfsResult<Vec<u8>> {
    let cipher = Aes128Gcm::new(AesGcmKey::<Aes128Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| DfsError::Crypto(format!("AES-GCM encrypt failed: {}", e)))?;

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a `nonce || ciphertext || tag` buffer produced by [`gcm_encrypt`].
pub fn gcm_decrypt(key: &[u8; 16], sealed: &[u8]) -> DfsResult<Vec<u8>> {
    if sealed.len() < GCM_NONCE_LEN {
        return Err(DfsError::Crypto("sealed buffer shorter than nonce".into()));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(GCM_NONCE_LEN);
    let cipher = Aes128Gcm::new(AesGcmKey::<Aes128Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| DfsError::Corruption("AES-GCM authentication failed".into()))
}

/// Prepends a file's SHA-256 digest to one shard's plaintext, ahead of
/// compression+encryption, so a receiver can confirm which file a lone
/// decrypted shard belongs to before trusting its content (spec.md §4.4).
pub fn prepend_leading_hash(hash: &[u8; 32], shard: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LEADING_HASH_LEN + shard.len());
    out.extend_from_slice(hash);
    out.extend_from_slice(shard);
    out
}

/// Strips the leading file-hash added by [`prepend_leading_hash`], checking
/// it against `expected` before returning the remaining shard bytes.
pub fn strip_and_verify_leading_hash(buf: &[u8], expected: &[u8; 32]) -> DfsResult<Vec<u8>> {
    if buf.len() < LEADING_HASH_LEN {
        return Err(DfsError::Corruption("shard shorter than leading hash".into()));
    }
    let (leading, rest) = buf.split_at(LEADING_HASH_LEN);
    if leading != expected {
        return Err(DfsError::Corruption("shard's leading file-hash does not match".into()));
    }
    Ok(rest.to_vec())
}

type Aes256Ctr = ctr::Ctr64BE<Aes256>;

/// Legacy unauthenticated AES-256-CTR stream cipher, used only for the
/// compatibility path noted in spec.md §4.2 — callers that need integrity
/// guarantees should use [`gcm_encrypt`]/[`gcm_decrypt`] instead.
pub fn ctr_apply(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(&mut buf);
    buf
}

/// Gzip-compresses `data` at default compression level.
pub fn gzip_compress(data: &[u8]) -> DfsResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(data, Compression::default());
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .map_err(|e| DfsError::Crypto(format!("gzip compress failed: {}", e)))?;
    Ok(out)
}

/// Decompresses a gzip stream produced by [`gzip_compress`].
pub fn gzip_decompress(data: &[u8]) -> DfsResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DfsError::Corruption(format!("gzip decompress failed: {}", e)))?;
    Ok(out)
}

/// SHA-256 digest, used for `FileMeta.sha256_hash` and the download-side
/// leading-hash check (spec.md §4.4).
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// CRC32 checksum, used per-shard for cheap corruption detection ahead of
/// the (expensive) signature check.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Generates a new secp256k1 signing keypair for a file's owner.
pub fn generate_signing_key() -> (SecretKey, PublicKey) {
    let secret = SecretKey::random(&mut rand::rngs::OsRng);
    let public = PublicKey::from_secret_key(&secret);
    (secret, public)
}

/// Signs the canonical bytes of a [`crate::models::SignaturePayload`].
pub fn sign(secret: &SecretKey, canonical_bytes: &[u8]) -> Signature {
    let digest = sha256(canonical_bytes);
    let message = Message::parse(&digest);
    let (signature, _recovery_id) = libsecp256k1::sign(&message, secret);
    signature
}

/// Verifies a signature produced by [`sign`] against the owner's public key.
pub fn verify(public: &PublicKey, canonical_bytes: &[u8], signature: &Signature) -> bool {
    let digest = sha256(canonical_bytes);
    let message = Message::parse(&digest);
    libsecp256k1::verify(&message, signature, public)
}

/// Parses a compact-format signature produced by [`sign`]'s `serialize()`.
pub fn signature_from_bytes(bytes: &[u8]) -> DfsResult<Signature> {
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| DfsError::Crypto("signature must be 64 bytes".into()))?;
    Ok(Signature::parse_standard(&arr).map_err(|e| DfsError::Crypto(format!("invalid signature: {:?}", e)))?)
}

/// Parses a compressed or uncompressed secp256k1 public key.
pub fn public_key_from_bytes(bytes: &[u8]) -> DfsResult<PublicKey> {
    PublicKey::parse_slice(bytes, None)
        .map_err(|e| DfsError::Crypto(format!("invalid public key: {:?}", e)))
}

/// Mints a fresh 32-byte per-file encryption secret.
pub fn generate_file_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// Splits a per-file secret into `n` Shamir shares with threshold `k`
/// (spec.md §4.2 — fixed at n=3, k=2 by [`crate::models::FileSecurity`]).
pub fn shamir_split(secret: &[u8], n: u8, k: u8) -> DfsResult<Vec<Vec<u8>>> {
    let sharks = Sharks(k);
    let dealer = sharks
        .dealer(secret);
    Ok(dealer.take(n as usize).map(|share| Vec::from(&share)).collect())
}

/// Recombines `k` or more Shamir shares back into the original secret.
pub fn shamir_combine(shares: &[Vec<u8>], k: u8) -> DfsResult<Vec<u8>> {
    if shares.len() < k as usize {
        return Err(DfsError::Crypto(format!(
            "need at least {} shares to recombine, got {}",
            k,
            shares.len()
        )));
    }
    let sharks = Sharks(k);
    let parsed: Result<Vec<Share>, _> = shares.iter().map(|s| Share::try_from(s.as_slice())).collect();
    let parsed = parsed.map_err(|e| DfsError::Crypto(format!("invalid shamir share: {}", e)))?;
    sharks
        .recover(&parsed)
        .map_err(|e| DfsError::Crypto(format!("shamir recombine failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcm_round_trips() {
        let key = derive_gcm_key(&generate_file_secret());
        let sealed = gcm_encrypt(&key, b"the quick brown fox").unwrap();
        let opened = gcm_decrypt(&key, &sealed).unwrap();
        assert_eq!(opened, b"the quick brown fox");
    }

    #[test]
    fn gcm_rejects_tampered_ciphertext() {
        let key = derive_gcm_key(&generate_file_secret());
        let mut sealed = gcm_encrypt(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(gcm_decrypt(&key, &sealed).is_err());
    }

    #[test]
    fn gzip_round_trips() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbbbbbbbbbbbbb";
        let compressed = gzip_compress(data).unwrap();
        let restored = gzip_decompress(&compressed).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn signature_round_trips() {
        let (secret, public) = generate_signing_key();
        let payload = b"canonical-bytes-for-signing";
        let signature = sign(&secret, payload);
        assert!(verify(&public, payload, &signature));
        assert!(!verify(&public, b"different-bytes", &signature));
    }

    #[test]
    fn shamir_recombines_from_any_k_of_n_shares() {
        let secret = generate_file_secret();
        let shares = shamir_split(&secret, 3, 2).unwrap();
        assert_eq!(shares.len(), 3);

        let recombined = shamir_combine(&shares[0..2], 2).unwrap();
        assert_eq!(recombined, secret);

        let recombined_other_pair = shamir_combine(&[shares[0].clone(), shares[2].clone()], 2).unwrap();
        assert_eq!(recombined_other_pair, secret);
    }

    #[test]
    fn shamir_combine_rejects_insufficient_shares() {
        let secret = generate_file_secret();
        let shares = shamir_split(&secret, 3, 2).unwrap();
        assert!(shamir_combine(&shares[0..1], 2).is_err());
    }
}
