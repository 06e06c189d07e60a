//! Client side of the certificate authority's signing API.

mod error;
mod grpc;

pub use error::AuthorityError;
pub use grpc::GrpcAuthorityClient;

use crate::credential::{CsrRequest, IssuedCertificate};
use crate::platform::IdentityProvider;
use async_trait::async_trait;

/// Submits CSRs to a certificate authority.
///
/// A returned [`IssuedCertificate`] may still be a rejection
/// (`approved == false`) or carry no certificate; classifying those outcomes
/// is left to the caller.
#[async_trait]
pub trait AuthorityClient: Send + Sync + 'static {
    /// Sends `request` to the authority at `address`, authenticating the
    /// connection with `platform`'s transport credentials when it has any.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthorityError`] if the authority cannot be reached or the
    /// call fails at the RPC level.
    async fn send_csr(
        &self,
        request: &CsrRequest,
        platform: &dyn IdentityProvider,
        address: &str,
    ) -> Result<IssuedCertificate, AuthorityError>;
}
