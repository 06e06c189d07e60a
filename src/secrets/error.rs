use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by secret sinks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SecretError {
    /// Writing a secret file failed.
    #[error("failed to write {}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Sink-specific failure (used by custom sinks).
    #[error("{0}")]
    Other(String),
}
