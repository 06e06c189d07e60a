//! Node platform integration: who this node is and how it proves it.

mod error;
mod onprem;

pub use error::PlatformError;
pub use onprem::OnPremIdentityProvider;

use crate::credential::Identity;
use std::fmt;
use zeroize::Zeroizing;

/// Source of the node's identity and platform credential.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Whether the agent runs on the platform this provider supports.
    fn is_proper_platform(&self) -> bool;

    /// The node's service identity.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if the identity cannot be determined.
    fn service_identity(&self) -> Result<Identity, PlatformError>;

    /// The credential attached to every signing request.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if the credential cannot be read.
    fn agent_credential(&self) -> Result<Vec<u8>, PlatformError>;

    /// Kind of credential returned by [`agent_credential`](Self::agent_credential).
    fn credential_type(&self) -> String;

    /// TLS material for the connection to the authority, if the platform
    /// authenticates that connection.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if configured material cannot be read.
    fn transport_credentials(&self) -> Result<Option<TransportCredentials>, PlatformError> {
        Ok(None)
    }
}

/// PEM material for a mutually authenticated authority connection.
#[derive(Clone)]
pub struct TransportCredentials {
    /// Root certificate(s) trusted for the authority's server certificate.
    pub root_cert_pem: Vec<u8>,
    /// Client certificate chain.
    pub cert_chain_pem: Vec<u8>,
    /// Client private key.
    pub key_pem: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for TransportCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCredentials")
            .field("root_cert_pem_len", &self.root_cert_pem.len())
            .field("cert_chain_pem_len", &self.cert_chain_pem.len())
            .field("key_pem", &"<redacted>")
            .finish()
    }
}
