use super::{AuthorityClient, AuthorityError};
use crate::credential::{CsrRequest, IssuedCertificate};
use crate::platform::IdentityProvider;
use crate::prelude::debug;
use crate::proto::certificate_authority_client::CertificateAuthorityClient;
use crate::proto::CsrRequest as ProtoCsrRequest;
use crate::transport::{connect, Endpoint, TransportError};
use async_trait::async_trait;
use std::time::Duration;

/// [`AuthorityClient`] speaking `nodeagent.v1.CertificateAuthority` over gRPC.
///
/// A fresh connection is opened for every request so that rotated transport
/// credentials take effect on the next attempt.
#[derive(Debug, Clone, Default)]
pub struct GrpcAuthorityClient {
    timeout: Option<Duration>,
}

impl GrpcAuthorityClient {
    /// Creates a client without a per-request timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds each signing RPC by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl AuthorityClient for GrpcAuthorityClient {
    async fn send_csr(
        &self,
        request: &CsrRequest,
        platform: &dyn IdentityProvider,
        address: &str,
    ) -> Result<IssuedCertificate, AuthorityError> {
        let endpoint = Endpoint::parse(address).map_err(TransportError::from)?;
        let credentials = platform.transport_credentials()?;
        let channel = connect(&endpoint, credentials.as_ref()).await?;

        let mut grpc_request = tonic::Request::new(ProtoCsrRequest {
            csr_pem: request.csr_pem.clone(),
            node_agent_credential: request.credential.clone(),
            credential_type: request.credential_type.clone(),
            requested_ttl_minutes: request.requested_ttl_minutes,
            for_ca: request.for_ca,
        });
        if let Some(timeout) = self.timeout {
            grpc_request.set_timeout(timeout);
        }

        let response = CertificateAuthorityClient::new(channel)
            .handle_csr(grpc_request)
            .await?
            .into_inner();

        if let Some(status) = response.status.as_ref().filter(|s| s.code != 0) {
            debug!(
                "Authority status for CSR: code={}, message={}",
                status.code, status.message
            );
        }

        Ok(IssuedCertificate {
            approved: response.is_approved,
            signed_cert: response.signed_cert,
            cert_chain: response.cert_chain,
        })
    }
}
