//! Service-layer error types.
//!
//! `ServiceError` is transport-agnostic. The HTTP crate maps it to status
//! codes; the binary treats any error from startup as fatal.

use std::path::PathBuf;

/// Service error shared by the store, the codec and the lifecycle glue.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing or invalid configuration value. Fatal at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Read, write or rename failure on the snapshot file.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot file is neither the current nor the legacy schema.
    #[error("malformed snapshot: {0}")]
    MalformedData(String),

    /// Internal error (serialization, task join).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
