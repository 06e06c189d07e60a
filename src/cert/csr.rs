use super::error::CsrError;
use rand::rngs::OsRng;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, Ia5String, KeyPair, SanType, PKCS_RSA_SHA256,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::fmt;
use std::net::IpAddr;
use zeroize::Zeroizing;

/// Smallest RSA modulus the signing backend accepts.
const MIN_RSA_KEY_SIZE: usize = 2048;

/// Inputs for one CSR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrOptions {
    /// Identity placed in the subject alternative name.
    pub host: String,
    /// Subject organization; omitted when empty.
    pub org: String,
    /// RSA modulus size in bits.
    pub rsa_key_size: usize,
}

/// A PEM-encoded CSR and its PEM-encoded PKCS#8 private key.
pub struct GeneratedCsr {
    /// The certificate signing request.
    pub csr_pem: Vec<u8>,
    /// The private key; wiped on drop.
    pub private_key_pem: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for GeneratedCsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedCsr")
            .field("csr_pem_len", &self.csr_pem.len())
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Produces a fresh key pair and CSR.
///
/// Implementations are CPU bound; the lifecycle engine calls them on the
/// blocking thread pool.
pub trait CsrGenerator: Send + Sync + 'static {
    /// Generates a new private key and a CSR for `options.host`.
    ///
    /// # Errors
    ///
    /// Returns a [`CsrError`] if key generation or CSR encoding fails.
    fn generate(&self, options: &CsrOptions) -> Result<GeneratedCsr, CsrError>;
}

/// [`CsrGenerator`] producing RSA keys signed with PKCS#1 v1.5 / SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaCsrGenerator;

impl CsrGenerator for RsaCsrGenerator {
    fn generate(&self, options: &CsrOptions) -> Result<GeneratedCsr, CsrError> {
        if options.host.is_empty() {
            return Err(CsrError::MissingHost);
        }
        if options.rsa_key_size < MIN_RSA_KEY_SIZE {
            return Err(CsrError::KeySizeTooSmall(options.rsa_key_size));
        }

        let key = RsaPrivateKey::new(&mut OsRng, options.rsa_key_size)
            .map_err(CsrError::KeyGeneration)?;
        let key_pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(CsrError::KeyEncoding)?;
        let key_pair =
            KeyPair::from_pem_and_sign_algo(&key_pem, &PKCS_RSA_SHA256).map_err(CsrError::Csr)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        if !options.org.is_empty() {
            params
                .distinguished_name
                .push(DnType::OrganizationName, options.org.as_str());
        }
        params.subject_alt_names = vec![san_for_host(&options.host)?];

        let csr = params.serialize_request(&key_pair).map_err(CsrError::Csr)?;
        let csr_pem = csr.pem().map_err(CsrError::Csr)?;

        Ok(GeneratedCsr {
            csr_pem: csr_pem.into_bytes(),
            private_key_pem: Zeroizing::new(key_pem.as_bytes().to_vec()),
        })
    }
}

/// URI SAN for URI-shaped identities, IP SAN for addresses, DNS SAN otherwise.
fn san_for_host(host: &str) -> Result<SanType, CsrError> {
    if host.contains("://") {
        return Ia5String::try_from(host)
            .map(SanType::URI)
            .map_err(CsrError::Csr);
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SanType::IpAddress(ip));
    }
    Ia5String::try_from(host)
        .map(SanType::DnsName)
        .map_err(CsrError::Csr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_parser::certification_request::X509CertificationRequest;
    use x509_parser::extensions::{GeneralName, ParsedExtension};
    use x509_parser::pem::parse_x509_pem;
    use x509_parser::prelude::FromDer;

    fn options(host: &str) -> CsrOptions {
        CsrOptions {
            host: host.to_string(),
            org: "Juju org".to_string(),
            rsa_key_size: 2048,
        }
    }

    #[test]
    fn test_generate_csr_carries_identity_and_org() {
        let generated = RsaCsrGenerator
            .generate(&options("spiffe://cluster.local/ns/default/sa/node"))
            .unwrap();

        let (_, key_pem) = parse_x509_pem(&generated.private_key_pem).unwrap();
        assert_eq!(key_pem.label, "PRIVATE KEY");

        let (_, csr_pem) = parse_x509_pem(&generated.csr_pem).unwrap();
        assert_eq!(csr_pem.label, "CERTIFICATE REQUEST");

        let (_, csr) = X509CertificationRequest::from_der(&csr_pem.contents).unwrap();
        let info = &csr.certification_request_info;
        let org = info
            .subject
            .iter_organization()
            .next()
            .and_then(|attr| attr.as_str().ok());
        assert_eq!(org, Some("Juju org"));

        let uris: Vec<String> = csr
            .requested_extensions()
            .into_iter()
            .flatten()
            .filter_map(|ext| match ext {
                ParsedExtension::SubjectAlternativeName(san) => Some(san),
                _ => None,
            })
            .flat_map(|san| san.general_names.iter())
            .filter_map(|name| match name {
                GeneralName::URI(uri) => Some((*uri).to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(uris, vec!["spiffe://cluster.local/ns/default/sa/node"]);
    }

    #[test]
    fn test_generate_fresh_key_every_call() {
        let a = RsaCsrGenerator.generate(&options("node.example.org")).unwrap();
        let b = RsaCsrGenerator.generate(&options("node.example.org")).unwrap();
        assert_ne!(*a.private_key_pem, *b.private_key_pem);
    }

    #[test]
    fn test_generate_rejects_empty_host_and_small_keys() {
        assert!(matches!(
            RsaCsrGenerator.generate(&options("")),
            Err(CsrError::MissingHost)
        ));

        let mut small = options("node.example.org");
        small.rsa_key_size = 1024;
        assert!(matches!(
            RsaCsrGenerator.generate(&small),
            Err(CsrError::KeySizeTooSmall(1024))
        ));
    }

    #[test]
    fn test_san_for_host_picks_san_type() {
        assert!(matches!(
            san_for_host("spiffe://td/ns/a"),
            Ok(SanType::URI(_))
        ));
        assert!(matches!(san_for_host("10.0.0.1"), Ok(SanType::IpAddress(_))));
        assert!(matches!(
            san_for_host("node.example.org"),
            Ok(SanType::DnsName(_))
        ));
    }
}
