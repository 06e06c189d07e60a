//! Persistence of the node's issued certificate and private key.

mod error;
mod file;

pub use error::SecretError;
pub use file::FileSecretSink;

/// Destination for newly issued credentials.
///
/// The engine always writes the certificate before the key.
pub trait SecretSink: Send + Sync + 'static {
    /// Stores the PEM certificate chain (leaf first).
    ///
    /// # Errors
    ///
    /// Returns a [`SecretError`] if the chain cannot be persisted.
    fn set_identity_cert(&self, cert_chain_pem: &[u8]) -> Result<(), SecretError>;

    /// Stores the PEM private key matching the last certificate.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretError`] if the key cannot be persisted.
    fn set_identity_private_key(&self, key_pem: &[u8]) -> Result<(), SecretError>;
}
