//! Error types for Engram

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Engram operations
#[derive(Error, Debug)]
pub enum EngramError {
    /// Record lookup miss. Recoverable; the caller decides what to do.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A record file exists but fails to decode. Logged and excluded from
    /// scan results, surfaced directly on single-record retrieval.
    #[error("corrupt record at {path}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    /// I/O errors from the durable store. Fatal to the enclosing call.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Similarity index failures. Absorbed at the facade boundary.
    #[error("index error: {0}")]
    Index(String),

    /// A crosslink back-patch target does not exist or has the wrong kind.
    /// Absorbed by the crosslink manager; back-patching is best-effort.
    #[error("crosslink target missing: {0}")]
    CrosslinkTargetMissing(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngramError {
    /// True when this error is a plain lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngramError::NotFound(_))
    }
}

/// Result type alias for Engram operations
pub type Result<T> = std::result::Result<T, EngramError>;
