/// Shared data model (spec.md §3).
///
/// These types describe the logical content of a shard envelope and its
/// supporting records; [`crate::segment_codec`] handles the wire/on-disk
/// byte layout and [`crate::task_store`] handles persistence.
use serde::{Deserialize, Serialize};

use crate::segment_codec::HashTableEntry;

/// File-level metadata carried by every shard of a file (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMeta {
    pub file_id: String,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub content_type: String,
    pub sha256_hash: String,
    pub upload_time: i64,
}

/// Ownership and per-file cryptographic material (spec.md §3, §4.2).
///
/// `encryption_secret` never leaves the uploading node; only its Shamir
/// shares (one per shard, n=3 k=2) are distributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSecurity {
    pub owner_public_key: Vec<u8>,
    pub p2pkh_script: String,
    pub p2pk_script: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_secret: Option<[u8; 32]>,
    pub shamir_n: u8,
    pub shamir_k: u8,
}

impl FileSecurity {
    /// `P2PKH`-style script: spend requires both the public key and its hash.
    pub fn build_p2pkh_script(pubkey_hash: &str) -> String {
        format!("OP_DUP OP_HASH160 {} OP_EQUALVERIFY OP_CHECKSIG", pubkey_hash)
    }

    /// `P2PK`-style script: spend requires only a valid signature from the key.
    pub fn build_p2pk_script(pubkey_hex: &str) -> String {
        format!("{} OP_CHECKSIG", pubkey_hex)
    }

    /// Pulls the embedded pubkey-hash back out of a `P2PKH` script built by
    /// [`build_p2pkh_script`], for download-checklist access gating.
    pub fn pubkey_hash_from_p2pkh_script(script: &str) -> Option<&str> {
        script.split_whitespace().nth(2)
    }
}

/// The manifest of all shards belonging to one file, spec.md §3 `HashTable`.
pub type HashTable = Vec<HashTableEntry>;

/// Canonical payload signed by the file owner over one shard envelope.
///
/// Field order matters: the signature covers `file_id`, `content_type`,
/// `sha256`, the full (index-sorted) hash table, `segment_id`,
/// `segment_index`, `crc32`, and finally the encrypted payload itself, so a
/// verifier can check a lone shard's authenticity — including tamper-proofing
/// the ciphertext it actually received — without holding every other shard.
pub struct SignaturePayload<'a> {
    pub file_id: &'a str,
    pub content_type: &'a str,
    pub sha256: &'a str,
    pub hash_table: &'a [HashTableEntry],
    pub segment_id: &'a str,
    pub segment_index: i64,
    pub crc32: u32,
    pub encrypted_payload: &'a [u8],
}

impl<'a> SignaturePayload<'a> {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        use crate::segment_codec::{encode_bytes, encode_hash_table, encode_i64, encode_string, encode_u32};

        let mut out = Vec::new();
        out.extend_from_slice(&encode_string(self.file_id));
        out.extend_from_slice(&encode_string(self.content_type));
        out.extend_from_slice(&encode_string(self.sha256));
        out.extend_from_slice(&encode_hash_table(self.hash_table));
        out.extend_from_slice(&encode_string(self.segment_id));
        out.extend_from_slice(&encode_i64(self.segment_index));
        out.extend_from_slice(&encode_u32(self.crc32));
        out.extend_from_slice(&encode_bytes(self.encrypted_payload));
        out
    }
}

/// One shard as it travels over the wire / sits on disk, spec.md §4.1/§6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardEnvelope {
    pub meta: FileMeta,
    pub p2pkh_script: String,
    pub p2pk_script: String,
    pub hash_table: Vec<HashTableEntry>,
    pub segment_id: String,
    pub segment_index: i64,
    pub crc32: u32,
    /// Encrypted (and, if the shard is a data shard, gzip-compressed before
    /// encryption) shard content.
    pub content: Vec<u8>,
    /// This shard's Shamir share of the file's encryption secret.
    pub encryption_share: Vec<u8>,
    pub signature: Vec<u8>,
    pub shared: bool,
    pub version: u32,
}

/// Resolved storage strategy for one upload task, chosen once at task
/// creation and then fixed for the task's lifetime (spec.md §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum StorageMode {
    /// Entire file as one shard, no erasure coding.
    File,
    /// Fixed-size slices, no erasure coding.
    Slice,
    /// Reed-Solomon with explicit `(k, m)` shard counts.
    RsSize { k: usize, m: usize },
    /// Reed-Solomon with a parity ratio applied to a size-derived `k`.
    RsProportion { ratio: f64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Spec.md §5 precondition table: which transitions are legal.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Paused)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
                | (Paused, InProgress)
                | (Paused, Cancelled)
                | (Failed, InProgress)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTaskRecord {
    pub task_id: String,
    pub file_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub storage_mode: StorageMode,
    pub status: TaskStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Lifecycle of one shard within an upload task (spec.md §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShardStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadShardRecord {
    pub task_id: String,
    pub segment_index: i64,
    pub segment_id: String,
    pub peer_id: Option<String>,
    pub crc32: u32,
    pub is_parity: bool,
    pub status: ShardStatus,
}

/// Catalog entry for a finished upload, written at Finalize once every
/// shard has been dispatched and confirmed stored (spec.md §4.6). Unlike
/// [`UploadTaskRecord`], which is scoped to one in-flight task and dropped
/// once the upload completes, this is the durable, owner-scoped record of
/// a file actually present on the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAssetRecord {
    pub file_id: String,
    pub owner_pubkey_hash: String,
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
    pub sha256_hash: String,
    pub storage_mode: StorageMode,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTaskRecord {
    pub task_id: String,
    pub file_id: String,
    pub destination: String,
    pub status: TaskStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieceInfo {
    pub task_id: String,
    pub segment_index: i64,
    pub segment_id: String,
    pub peer_id: Option<String>,
    pub retrieved: bool,
}

/// Tracks where each shard of a completed upload physically lives, so a
/// future download/delete knows which peers to contact (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSegmentStorage {
    pub file_id: String,
    pub segment_index: i64,
    pub segment_id: String,
    pub peer_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_payload_is_stable_regardless_of_hash_table_input_order() {
        let entries_a = vec![
            HashTableEntry { index: 1, segment_id: "b".into(), crc32: 2, is_parity: false },
            HashTableEntry { index: 0, segment_id: "a".into(), crc32: 1, is_parity: false },
        ];
        let entries_b = vec![
            HashTableEntry { index: 0, segment_id: "a".into(), crc32: 1, is_parity: false },
            HashTableEntry { index: 1, segment_id: "b".into(), crc32: 2, is_parity: false },
        ];

        let payload_a = SignaturePayload {
            file_id: "f1",
            content_type: "application/pdf",
            sha256: "deadbeef",
            hash_table: &entries_a,
            segment_id: "f1-0",
            segment_index: 0,
            crc32: 1,
            encrypted_payload: b"ciphertext",
        };
        let payload_b = SignaturePayload {
            file_id: "f1",
            content_type: "application/pdf",
            sha256: "deadbeef",
            hash_table: &entries_b,
            segment_id: "f1-0",
            segment_index: 0,
            crc32: 1,
            encrypted_payload: b"ciphertext",
        };

        assert_eq!(payload_a.canonical_bytes(), payload_b.canonical_bytes());
    }

    #[test]
    fn task_status_transitions_follow_precondition_table() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Paused));
        assert!(TaskStatus::Paused.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::InProgress));
    }
}
