/// Error Handling System
///
/// Structured error types for the upload/download core, one variant per
/// failure category from the error-kind taxonomy: `NotFound`, `Transient`,
/// `Permanent`, `Corruption`, `Capacity`, `Cancelled`, `PreconditionFailed`,
/// plus the system-level categories (`Io`, `Network`, `Database`, `Config`)
/// that the other categories are usually built from.
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub enum DfsError {
    /// File system I/O failures.
    Io(String),
    /// Network/transport failures: dial, send, receive, timeout.
    Network(String),
    /// SQLite/task-store failures.
    Database(String),
    /// Invalid or missing configuration.
    Config(String),
    /// Cryptographic operation failures (encrypt, decrypt, sign, verify, split/combine).
    Crypto(String),
    /// Erasure-coding or on-disk envelope failures: bad signature, bad checksum,
    /// unparseable segment codec container, insufficient shards to reconstruct.
    Corruption(String),
    /// Authentication/authorization failures — wrong key, access denied.
    Permanent(String),
    /// Retryable failures local to one attempt; caller should back off and retry.
    Transient(String),
    /// No such task, shard, peer, or record.
    NotFound(String),
    /// Resource limit reached (MaxSessions, temp-store full).
    Capacity(String),
    /// The task's scope was cancelled; work unwound without a status rewrite.
    Cancelled(String),
    /// The requested command does not apply to the task's current status.
    PreconditionFailed(String),
    /// Catch-all for errors that don't need their own category.
    Generic(String),
}

impl fmt::Display for DfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfsError::Io(e) => write!(f, "I/O error: {}", e),
            DfsError::Network(e) => write!(f, "network error: {}", e),
            DfsError::Database(e) => write!(f, "database error: {}", e),
            DfsError::Config(e) => write!(f, "configuration error: {}", e),
            DfsError::Crypto(e) => write!(f, "cryptographic error: {}", e),
            DfsError::Corruption(e) => write!(f, "corruption detected: {}", e),
            DfsError::Permanent(e) => write!(f, "permanent failure: {}", e),
            DfsError::Transient(e) => write!(f, "transient failure: {}", e),
            DfsError::NotFound(e) => write!(f, "not found: {}", e),
            DfsError::Capacity(e) => write!(f, "capacity exceeded: {}", e),
            DfsError::Cancelled(e) => write!(f, "cancelled: {}", e),
            DfsError::PreconditionFailed(e) => write!(f, "precondition failed: {}", e),
            DfsError::Generic(e) => write!(f, "error: {}", e),
        }
    }
}

impl StdError for DfsError {}

impl From<std::io::Error> for DfsError {
    fn from(error: std::io::Error) -> Self {
        DfsError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for DfsError {
    fn from(error: serde_json::Error) -> Self {
        DfsError::Generic(format!("serialization error: {}", error))
    }
}

impl From<rusqlite::Error> for DfsError {
    fn from(error: rusqlite::Error) -> Self {
        DfsError::Database(error.to_string())
    }
}

impl From<reed_solomon_erasure::Error> for DfsError {
    fn from(error: reed_solomon_erasure::Error) -> Self {
        DfsError::Corruption(format!("reed-solomon error: {:?}", error))
    }
}

impl From<hex::FromHexError> for DfsError {
    fn from(error: hex::FromHexError) -> Self {
        DfsError::Generic(format!("hex decode error: {}", error))
    }
}

impl From<libp2p::kad::store::Error> for DfsError {
    fn from(error: libp2p::kad::store::Error) -> Self {
        DfsError::Network(format!("kademlia store error: {:?}", error))
    }
}

impl From<toml::de::Error> for DfsError {
    fn from(error: toml::de::Error) -> Self {
        DfsError::Config(format!("TOML parse error: {}", error))
    }
}

impl From<toml::ser::Error> for DfsError {
    fn from(error: toml::ser::Error) -> Self {
        DfsError::Config(format!("TOML serialize error: {}", error))
    }
}

/// Result type alias for upload/download core operations.
pub type DfsResult<T> = Result<T, DfsError>;
