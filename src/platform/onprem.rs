use super::{IdentityProvider, PlatformError, TransportCredentials};
use crate::cert::parsing::extract_single_identity;
use crate::constants::ONPREM_CREDENTIAL_TYPE;
use crate::credential::Identity;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Identity provider for nodes provisioned with a certificate on disk.
///
/// The node identity is the single SAN of the certificate in `cert_chain_file`,
/// and the file itself is the platform credential. Because the rotated
/// certificate is written back to the same path, every renewal is
/// authenticated with the previous certificate.
#[derive(Debug, Clone)]
pub struct OnPremIdentityProvider {
    root_cert_file: PathBuf,
    key_file: PathBuf,
    cert_chain_file: PathBuf,
}

impl OnPremIdentityProvider {
    /// Creates a provider reading the given PEM files.
    pub fn new(
        root_cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
        cert_chain_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root_cert_file: root_cert_file.into(),
            key_file: key_file.into(),
            cert_chain_file: cert_chain_file.into(),
        }
    }

    /// Path of the node certificate chain.
    pub fn cert_chain_file(&self) -> &Path {
        &self.cert_chain_file
    }

    /// Path of the node private key.
    pub fn key_file(&self) -> &Path {
        &self.key_file
    }
}

fn read(path: &Path) -> Result<Vec<u8>, PlatformError> {
    fs::read(path).map_err(|source| PlatformError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

impl IdentityProvider for OnPremIdentityProvider {
    fn is_proper_platform(&self) -> bool {
        true
    }

    fn service_identity(&self) -> Result<Identity, PlatformError> {
        let pem = read(&self.cert_chain_file)?;
        let id = extract_single_identity(&pem).map_err(|source| {
            PlatformError::InvalidCertificate {
                path: self.cert_chain_file.clone(),
                source,
            }
        })?;
        Ok(Identity::new(id))
    }

    fn agent_credential(&self) -> Result<Vec<u8>, PlatformError> {
        read(&self.cert_chain_file)
    }

    fn credential_type(&self) -> String {
        ONPREM_CREDENTIAL_TYPE.to_string()
    }

    fn transport_credentials(&self) -> Result<Option<TransportCredentials>, PlatformError> {
        Ok(Some(TransportCredentials {
            root_cert_pem: read(&self.root_cert_file)?,
            cert_chain_pem: read(&self.cert_chain_file)?,
            key_pem: Zeroizing::new(read(&self.key_file)?),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertError;
    use rcgen::{CertificateParams, KeyPair, SanType};

    fn write_cert(dir: &Path, sans: Vec<SanType>) -> (PathBuf, PathBuf) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.subject_alt_names = sans;
        let cert = params.self_signed(&key).unwrap();

        let cert_path = dir.join("cert-chain.pem");
        let key_path = dir.join("key.pem");
        fs::write(&cert_path, cert.pem()).unwrap();
        fs::write(&key_path, key.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn test_identity_and_credential_come_from_cert_chain() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = write_cert(
            dir.path(),
            vec![SanType::URI(
                "spiffe://cluster.local/ns/default/sa/node".try_into().unwrap(),
            )],
        );
        let root = dir.path().join("root-cert.pem");
        fs::copy(&cert, &root).unwrap();

        let provider = OnPremIdentityProvider::new(&root, &key, &cert);
        assert!(provider.is_proper_platform());
        assert_eq!(provider.credential_type(), "onprem");
        assert_eq!(
            provider.service_identity().unwrap().as_str(),
            "spiffe://cluster.local/ns/default/sa/node"
        );
        assert_eq!(provider.agent_credential().unwrap(), fs::read(&cert).unwrap());

        let creds = provider.transport_credentials().unwrap().unwrap();
        assert_eq!(creds.root_cert_pem, fs::read(&root).unwrap());
        assert_eq!(*creds.key_pem, fs::read(&key).unwrap());
    }

    #[test]
    fn test_identity_requires_single_san() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = write_cert(dir.path(), vec![]);
        let provider = OnPremIdentityProvider::new(dir.path().join("root"), key, cert);

        assert!(matches!(
            provider.service_identity(),
            Err(PlatformError::InvalidCertificate {
                source: CertError::IdentityCount { count: 0 },
                ..
            })
        ));
    }

    #[test]
    fn test_missing_files_are_reported_with_path() {
        let provider = OnPremIdentityProvider::new("/nonexistent/root", "/nonexistent/key", "/nonexistent/chain");
        match provider.agent_credential() {
            Err(PlatformError::ReadFile { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/chain"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(provider.transport_credentials().is_err());
    }
}
