use crate::authority::AuthorityError;
use crate::cert::{CertError, CsrError};
use crate::platform::PlatformError;
use crate::secrets::SecretError;
use thiserror::Error;

/// Terminal errors of the lifecycle engine.
///
/// [`CertificateLifecycleEngine::run`](super::CertificateLifecycleEngine::run)
/// never returns successfully; each variant names the reason it stopped.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LifecycleError {
    /// A required collaborator was not set on the builder.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// The identity provider does not support this platform.
    #[error("node agent is not running on a supported platform")]
    NotProperPlatform,

    /// The node identity could not be determined.
    #[error("failed to get service identity")]
    Identity(#[source] PlatformError),

    /// The platform credential could not be read.
    #[error("failed to get agent credential")]
    Credential(#[source] PlatformError),

    /// CSR or key generation failed.
    #[error("failed to generate csr")]
    Csr(#[from] CsrError),

    /// The CSR generation task panicked or was cancelled.
    #[error("csr generation task failed")]
    CsrTask(#[from] tokio::task::JoinError),

    /// Persisting the certificate chain failed.
    #[error("failed to write certificate chain")]
    WriteCertificate(#[source] SecretError),

    /// Persisting the private key failed.
    #[error("failed to write private key")]
    WritePrivateKey(#[source] SecretError),

    /// Every allowed retry failed.
    #[error("csr signing failed after {attempts} retries")]
    RetriesExhausted {
        /// Retries performed before giving up.
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        last: AttemptFailure,
    },

    /// The engine is no longer running.
    #[error("lifecycle engine has terminated")]
    Closed,
}

/// Why a single issuance attempt did not produce a usable certificate.
///
/// All of these are retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptFailure {
    /// The authority could not be reached or the RPC failed.
    #[error("csr request failed")]
    Transport(#[source] AuthorityError),

    /// The authority declined to sign.
    #[error("csr request was rejected by the authority")]
    Rejected,

    /// The authority approved but returned no certificate.
    #[error("authority returned an empty certificate")]
    EmptyResponse,

    /// The renewal wait could not be computed from the issued certificate.
    #[error("failed to compute renewal wait from the issued certificate")]
    RenewalWait(#[source] CertError),
}
