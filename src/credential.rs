//! Artifacts passed between the lifecycle engine, its collaborators, and the
//! workload servers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// The node's own service identity.
///
/// Obtained once from the identity provider when the lifecycle engine starts and
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Wraps an identity string as returned by an identity provider.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A freshly generated private key and the CSR built from it.
///
/// One artifact is created per issuance attempt. The private key is wiped from
/// memory when the artifact is dropped, so an attempt that fails before the key
/// reaches the secret sink leaves nothing behind.
pub struct CsrArtifact {
    private_key: Zeroizing<Vec<u8>>,
    csr_pem: Vec<u8>,
    requested_ttl: Duration,
}

impl CsrArtifact {
    /// Bundles a CSR with its private key and the TTL it asks for.
    pub fn new(
        csr_pem: Vec<u8>,
        private_key: impl Into<Zeroizing<Vec<u8>>>,
        requested_ttl: Duration,
    ) -> Self {
        Self {
            private_key: private_key.into(),
            csr_pem,
            requested_ttl,
        }
    }

    /// PEM-encoded private key.
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// PEM-encoded certificate signing request.
    pub fn csr_pem(&self) -> &[u8] {
        &self.csr_pem
    }

    /// TTL requested from the authority.
    pub fn requested_ttl(&self) -> Duration {
        self.requested_ttl
    }
}

impl fmt::Debug for CsrArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrArtifact")
            .field("private_key", &"<redacted>")
            .field("csr_pem_len", &self.csr_pem.len())
            .field("requested_ttl", &self.requested_ttl)
            .finish()
    }
}

/// Signing request submitted to the certificate authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrRequest {
    /// PEM-encoded CSR.
    pub csr_pem: Vec<u8>,
    /// Platform credential of this node.
    pub credential: Vec<u8>,
    /// Kind of platform credential (for example `onprem`).
    pub credential_type: String,
    /// Requested certificate lifetime, in whole minutes.
    pub requested_ttl_minutes: i32,
    /// Always `false`: the agent never asks for a CA certificate.
    pub for_ca: bool,
}

/// Converts a TTL to the whole-minute value carried by [`CsrRequest`].
pub(crate) fn ttl_minutes(ttl: Duration) -> i32 {
    i32::try_from(ttl.as_secs() / 60).unwrap_or(i32::MAX)
}

/// Outcome of a signing request as reported by the authority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuedCertificate {
    /// Whether the authority approved the request.
    pub approved: bool,
    /// PEM-encoded leaf certificate.
    pub signed_cert: Vec<u8>,
    /// PEM-encoded intermediate chain.
    pub cert_chain: Vec<u8>,
}

impl IssuedCertificate {
    /// An approved response.
    pub fn approved(signed_cert: impl Into<Vec<u8>>, cert_chain: impl Into<Vec<u8>>) -> Self {
        Self {
            approved: true,
            signed_cert: signed_cert.into(),
            cert_chain: cert_chain.into(),
        }
    }

    /// A rejected response.
    pub fn rejected() -> Self {
        Self::default()
    }

    /// Returns `true` if the response carries no signed certificate.
    pub fn is_empty(&self) -> bool {
        self.signed_cert.is_empty()
    }

    /// Leaf certificate followed by its chain; the layout written to the secret sink.
    pub fn full_chain(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.signed_cert.len() + self.cert_chain.len());
        out.extend_from_slice(&self.signed_cert);
        out.extend_from_slice(&self.cert_chain);
        out
    }
}

/// Attributes of a workload as delivered by an add/remove event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadAttributes {
    /// Unique workload id (pod UID).
    pub uid: String,
    /// Workload name.
    pub workload: String,
    /// Namespace the workload runs in.
    pub namespace: String,
    /// Service account the workload runs as.
    #[serde(rename = "serviceaccount", alias = "service_account")]
    pub service_account: String,
}

/// Workload add/remove event payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInfo {
    /// Workload attributes.
    pub attrs: WorkloadAttributes,
    /// Host path of the workload's credential volume, if any.
    #[serde(default, rename = "workloadpath", alias = "workload_path")]
    pub workload_path: String,
}

impl WorkloadInfo {
    /// Convenience constructor used by hosts and tests.
    pub fn new(
        uid: impl Into<String>,
        workload: impl Into<String>,
        namespace: impl Into<String>,
        service_account: impl Into<String>,
    ) -> Self {
        Self {
            attrs: WorkloadAttributes {
                uid: uid.into(),
                workload: workload.into(),
                namespace: namespace.into(),
                service_account: service_account.into(),
            },
            workload_path: String::new(),
        }
    }
}

/// Identity of a registered workload, served from that workload's socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadCredentials {
    /// Unique workload id; the registry key.
    pub uid: String,
    /// Workload name.
    pub name: String,
    /// Namespace.
    pub namespace: String,
    /// Service account.
    pub service_account: String,
}

impl From<&WorkloadInfo> for WorkloadCredentials {
    fn from(info: &WorkloadInfo) -> Self {
        Self {
            uid: info.attrs.uid.clone(),
            name: info.attrs.workload.clone(),
            namespace: info.attrs.namespace.clone(),
            service_account: info.attrs.service_account.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_minutes_truncates() {
        assert_eq!(ttl_minutes(Duration::from_secs(19 * 3600)), 1140);
        assert_eq!(ttl_minutes(Duration::from_secs(119)), 1);
        assert_eq!(ttl_minutes(Duration::from_secs(u64::MAX)), i32::MAX);
    }

    #[test]
    fn test_full_chain_concatenates_leaf_then_chain() {
        let issued = IssuedCertificate::approved(b"leaf".to_vec(), b"chain".to_vec());
        assert_eq!(issued.full_chain(), b"leafchain");
        assert!(!issued.is_empty());
        assert!(IssuedCertificate::rejected().is_empty());
    }

    #[test]
    fn test_workload_info_json_uses_event_field_names() {
        let json = r#"{"attrs":{"uid":"1111","workload":"foo","namespace":"default","serviceaccount":"sa"},"workloadpath":"/p"}"#;
        let info: WorkloadInfo = serde_json::from_str(json).unwrap();
        let creds = WorkloadCredentials::from(&info);

        assert_eq!(creds.uid, "1111");
        assert_eq!(creds.name, "foo");
        assert_eq!(creds.namespace, "default");
        assert_eq!(creds.service_account, "sa");
        assert_eq!(info.workload_path, "/p");
    }

    #[test]
    fn test_csr_artifact_debug_redacts_key() {
        let artifact = CsrArtifact::new(b"csr".to_vec(), b"secret".to_vec(), Duration::ZERO);
        let out = format!("{artifact:?}");
        assert!(!out.contains("secret"));
        assert!(out.contains("redacted"));
    }
}
