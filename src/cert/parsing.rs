//! PEM/X.509 parsing helpers.

use crate::cert::error::CertError;
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;
use x509_parser::nom::Err;
use x509_parser::oid_registry;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::GeneralName;
use x509_parser::error::X509Error;

const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// Upper bound on SAN entries inspected before giving up on a certificate.
const MAX_SAN_ENTRIES: usize = 32;

/// Owned view of the certificate fields the agent cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedCertificate {
    pub(crate) not_before: OffsetDateTime,
    pub(crate) not_after: OffsetDateTime,
    pub(crate) san_identities: Vec<String>,
}

/// Parses the first PEM block of `pem_bytes` as an X.509 certificate.
///
/// Trailing blocks (the rest of a chain) are ignored.
pub(crate) fn parse_pem_certificate(pem_bytes: &[u8]) -> Result<ParsedCertificate, CertError> {
    let (_, pem) = parse_x509_pem(pem_bytes).map_err(|e| CertError::Pem(e.to_string()))?;
    if pem.label != CERTIFICATE_PEM_LABEL {
        return Err(CertError::UnexpectedPemLabel(pem.label));
    }

    let cert = pem.parse_x509().map_err(|e| match e {
        Err::Incomplete(_) => CertError::ParseX509Certificate(X509Error::InvalidCertificate),
        Err::Error(err) | Err::Failure(err) => CertError::ParseX509Certificate(err),
    })?;

    let validity = cert.validity();
    Ok(ParsedCertificate {
        not_before: validity.not_before.to_datetime(),
        not_after: validity.not_after.to_datetime(),
        san_identities: san_identities(&cert)?,
    })
}

/// Collects URI and DNS SAN entries, the forms an identity can take.
fn san_identities(cert: &X509Certificate<'_>) -> Result<Vec<String>, CertError> {
    let ext = match cert
        .tbs_certificate
        .get_extension_unique(&oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME)?
    {
        None => return Ok(Vec::new()),
        Some(ext) => ext.parsed_extension(),
    };

    let san = match ext {
        ParsedExtension::SubjectAlternativeName(s) => s,
        _ => return Err(CertError::MissingSubjectAltName),
    };

    let mut ids = Vec::new();
    for name in san.general_names.iter().take(MAX_SAN_ENTRIES) {
        match name {
            GeneralName::URI(uri) => ids.push((*uri).to_owned()),
            GeneralName::DNSName(dns) => ids.push((*dns).to_owned()),
            _ => {}
        }
    }
    Ok(ids)
}

/// Returns the single SAN identity of the certificate.
pub(crate) fn extract_single_identity(pem_bytes: &[u8]) -> Result<String, CertError> {
    let mut cert = parse_pem_certificate(pem_bytes)?;
    if cert.san_identities.len() != 1 {
        return Err(CertError::IdentityCount {
            count: cert.san_identities.len(),
        });
    }
    Ok(cert.san_identities.remove(0))
}
