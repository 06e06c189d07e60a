use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`WorkloadCredentialServer::serve`](super::WorkloadCredentialServer::serve).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServeError {
    /// `serve` was called while the server is already serving.
    #[error("server is already serving")]
    AlreadyServing,

    /// `serve` was called after the server was stopped.
    #[error("server has been stopped")]
    Stopped,

    /// The socket directory could not be created.
    #[error("failed to create socket directory {}", path.display())]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stale socket file could not be removed.
    #[error("failed to remove stale socket {}", path.display())]
    RemoveStale {
        /// Socket path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The socket could not be bound.
    #[error("failed to bind {}", path.display())]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The gRPC server failed while serving.
    #[error("workload server failed")]
    Serve(#[from] tonic::transport::Error),
}

/// Errors returned by [`WorkloadRegistry`](super::WorkloadRegistry) operations.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// The UID is empty, `.`, `..`, or contains `/` or NUL.
    #[error("invalid workload uid: {0:?}")]
    InvalidUid(String),

    /// A server is already registered (or still being removed) for the UID.
    #[error("workload {0} is already registered")]
    Duplicate(String),

    /// No server is registered for the UID.
    #[error("workload {0} is not registered")]
    NotFound(String),

    /// Another removal of the UID is in progress.
    #[error("workload {0} is already being removed")]
    AlreadyRemoving(String),

    /// The server did not close its listener in time and was aborted.
    #[error("workload {uid} did not stop within {timeout:?}")]
    StopTimeout {
        /// Workload UID.
        uid: String,
        /// Configured stop timeout.
        timeout: Duration,
    },
}
