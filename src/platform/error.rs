use crate::cert::CertError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by identity providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlatformError {
    /// A credential file could not be read.
    #[error("failed to read {}", path.display())]
    ReadFile {
        /// The file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The node certificate does not yield a usable identity.
    #[error("invalid node certificate {}", path.display())]
    InvalidCertificate {
        /// The certificate file.
        path: PathBuf,
        /// Parsing or identity extraction error.
        #[source]
        source: CertError,
    },

    /// Provider-specific failure (used by custom providers).
    #[error("{0}")]
    Other(String),
}
