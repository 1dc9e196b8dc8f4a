//! Error types for the persistence crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be written.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An append-only entry already exists.
    #[error("{kind} already persisted: {id}")]
    AlreadyExists { kind: String, id: String },

    /// Record is not finalized and cannot be persisted.
    #[error("record not finalized: {0}")]
    NotFinalized(String),

    /// In-memory store lock was poisoned.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PersistenceError::AlreadyExists {
            kind: "request".into(),
            id: "r1".into(),
        };
        assert_eq!(err.to_string(), "request already persisted: r1");

        let err = PersistenceError::NotFinalized("r2".into());
        assert_eq!(err.to_string(), "record not finalized: r2");
    }
}
