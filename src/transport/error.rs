use crate::transport::EndpointError;
use thiserror::Error;

/// Errors produced while building a gRPC channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The endpoint address is malformed.
    #[error("invalid endpoint address")]
    Endpoint(#[from] EndpointError),

    /// The endpoint transport is unsupported on the current platform.
    #[error("unsupported endpoint transport: {scheme}")]
    UnsupportedEndpointTransport {
        /// The unsupported transport scheme.
        scheme: &'static str,
    },

    /// Transport error while connecting.
    #[error(transparent)]
    Tonic(#[from] tonic::transport::Error),
}
