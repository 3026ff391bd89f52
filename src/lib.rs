// ===================================================================================================
// meshvault - peer-to-peer content-addressed file storage
// ===================================================================================================
//
// A storage node splits each file into shards (whole-file, fixed-size
// slices, or Reed-Solomon data+parity), encrypts and signs each shard
// independently, and distributes them across a Kademlia-discovered peer
// set. Upload and download are each driven by a single channel-fed
// coroutine per task, persisted in SQLite so a crash mid-transfer can be
// reconciled on the next startup.
//
// ===== DATA MODEL =====
pub mod models; // FileMeta, FileSecurity, ShardEnvelope, task/piece records (spec.md §3)
pub mod segment_codec; // tag-length-value on-disk/wire envelope format (C1)
pub mod envelope; // ShardEnvelope <-> segment_codec wire/on-disk marshalling

// ===== CRYPTOGRAPHY AND ERASURE CODING =====
pub mod crypto; // AEAD encryption, signing, gzip, Shamir, hashing (C2)
pub mod erasure; // Reed-Solomon split/encode/reconstruct/join (C3)

// ===== LOCAL STORAGE =====
pub mod temp_store; // staging area for shard bytes in flight (C4)
pub mod shard_store; // custodian-side persistent shard storage
pub mod task_store; // SQLite-backed task/shard persistence (C5)

// ===== NETWORK AND P2P COMMUNICATION =====
pub mod network; // combined libp2p swarm: Kademlia + request_response + gossipsub
pub mod peer_selector; // nearest-peer selection over the DHT (C8)
pub mod transport; // shard send/forward RPC types (C9)
pub mod checklist; // download-request checklist protocol over gossipsub (spec.md §4.7)

// ===== TASK PIPELINES =====
pub mod upload; // upload pipeline coroutine (C6)
pub mod download; // download pipeline coroutine (C7)
pub mod task_manager; // session tracking, MaxSessions, startup reconciliation (C10)

// ===== COMMAND LINE INTERFACE AND USER INTERACTION =====
pub mod cli; // command line argument parsing and validation using clap
pub mod ui; // progress indicators and output formatting

// ===== SECURITY =====
pub mod key_manager; // secp256k1 signing keypair management for file owners

// ===== SYSTEM CONFIGURATION AND MANAGEMENT =====
pub mod config; // configuration management with TOML support

// ===== RELIABILITY =====
pub mod error; // core error types
pub mod resilience; // retry/backoff/circuit-breaker helpers
pub mod logging; // structured logging setup

// ===== UTILITIES =====
pub mod util;

// ===== CONVENIENCE RE-EXPORTS =====

pub use error::{DfsError, DfsResult};
pub use key_manager::KeyManager;
pub use task_manager::TaskManager;
