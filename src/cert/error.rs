//! Error types for certificate parsing, renewal timing, and CSR generation.

use time::OffsetDateTime;
use x509_parser::error::X509Error;

/// An error that may arise parsing a certificate or deriving its renewal time.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertError {
    /// The input does not contain a decodable PEM block.
    #[error("failed decoding PEM certificate: {0}")]
    Pem(String),

    /// The first PEM block is not a certificate.
    #[error("unexpected PEM block label: {0}")]
    UnexpectedPemLabel(String),

    /// Error returned by the X.509 parsing library.
    #[error("failed parsing X.509 certificate")]
    ParseX509Certificate(#[from] X509Error),

    /// The certificate carries no subject alternative name extension.
    #[error("certificate is missing the subject alternative name extension")]
    MissingSubjectAltName,

    /// The certificate does not carry exactly one SAN identity.
    #[error("certificate has {count} SAN identities, expected exactly 1")]
    IdentityCount {
        /// Number of URI/DNS SAN entries found.
        count: usize,
    },

    /// The certificate's not-after time is not in the future.
    #[error("certificate already expired at {not_after}, but now is {now}")]
    Expired {
        /// Not-after time of the certificate.
        not_after: OffsetDateTime,
        /// Time used for the comparison.
        now: OffsetDateTime,
    },

    /// The certificate is already inside its renewal grace period.
    #[error("certificate is inside its renewal grace period and should be renewed now")]
    RenewNow,
}

/// An error that may arise generating a private key and CSR.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CsrError {
    /// The CSR host (the node identity) is empty.
    #[error("CSR host must not be empty")]
    MissingHost,

    /// The requested RSA key size cannot be used for signing.
    #[error("RSA key size {0} is below the minimum of 2048 bits")]
    KeySizeTooSmall(usize),

    /// RSA key generation failed.
    #[error("failed generating RSA private key")]
    KeyGeneration(#[source] rsa::Error),

    /// The generated key could not be encoded as PKCS#8.
    #[error("failed encoding private key as PKCS#8")]
    KeyEncoding(#[source] rsa::pkcs8::Error),

    /// Building or signing the CSR failed.
    #[error("failed building certificate signing request")]
    Csr(#[source] rcgen::Error),
}
