use crate::platform::PlatformError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors produced while talking to the certificate authority.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthorityError {
    /// Transport credentials could not be loaded from the platform.
    #[error("failed to load transport credentials")]
    Credentials(#[from] PlatformError),

    /// The authority could not be reached.
    #[error("failed to connect to the certificate authority")]
    Transport(#[from] TransportError),

    /// The signing RPC failed.
    #[error("certificate authority returned an error status")]
    Status(#[from] tonic::Status),
}
