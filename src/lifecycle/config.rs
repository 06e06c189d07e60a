use crate::constants::{DEFAULT_AUTHORITY_ADDRESS, DEFAULT_RSA_KEY_SIZE, DEFAULT_WORKLOAD_CERT_TTL};
use crate::retry::RetryPolicy;
use std::time::Duration;

/// Static configuration of the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Organization placed in the CSR subject. Empty means none.
    pub organization: String,
    /// RSA modulus size for generated keys.
    pub rsa_key_size: usize,
    /// Lifetime requested for issued certificates.
    pub workload_cert_ttl: Duration,
    /// Authority address: `host:port`, `tcp://host:port` or `unix:///path`.
    pub authority_address: String,
    /// Retry policy for failed issuance attempts.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            organization: String::new(),
            rsa_key_size: DEFAULT_RSA_KEY_SIZE,
            workload_cert_ttl: DEFAULT_WORKLOAD_CERT_TTL,
            authority_address: DEFAULT_AUTHORITY_ADDRESS.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}
