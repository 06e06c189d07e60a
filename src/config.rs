//! Agent configuration file.
//!
//! A JSON document aggregating every knob of both halves of the agent.
//! Missing fields take their defaults, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "organization": "example",
//!   "authority_address": "istio-ca:8060",
//!   "workload_cert_ttl_secs": 68400,
//!   "csr_max_retries": 10,
//!   "workload": { "path_prefix": "/tmp/nodeagent", "sock_file": "/server.sock" },
//!   "stop_timeout_secs": 5
//! }
//! ```

use crate::constants::{
    DEFAULT_AUTHORITY_ADDRESS, DEFAULT_CERT_CHAIN_FILE, DEFAULT_CSR_INITIAL_RETRY_INTERVAL,
    DEFAULT_CSR_MAX_RETRIES, DEFAULT_KEY_FILE, DEFAULT_MGMT_SOCKET, DEFAULT_ROOT_CERT_FILE,
    DEFAULT_RSA_KEY_SIZE, DEFAULT_WORKLOAD_CERT_TTL,
};
use crate::lifecycle::EngineConfig;
use crate::platform::OnPremIdentityProvider;
use crate::retry::RetryPolicy;
use crate::secrets::FileSecretSink;
use crate::transport::{Endpoint, EndpointError};
use crate::workload::{WorkloadRegistry, WorkloadServerOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating an [`AgentConfig`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for [`AgentConfig`].
    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),

    /// The authority address is malformed.
    #[error("invalid authority address")]
    AuthorityAddress(#[source] EndpointError),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),

    /// The environment name is not one of `unspecified`, `onprem`, `gcp`, `aws`.
    #[error("unknown environment {0:?}")]
    UnknownEnvironment(String),

    /// The environment is known but has no identity provider.
    #[error("environment {0} is not supported")]
    UnsupportedEnvironment(Environment),
}

/// Platform the node runs on. Only [`Environment::Onprem`] has an identity
/// provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Not configured.
    Unspecified,
    /// Node certificate files on local disk.
    #[default]
    Onprem,
    /// Google Cloud.
    Gcp,
    /// Amazon Web Services.
    Aws,
}

impl Environment {
    /// The lowercase name used on the command line and in config files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Onprem => "onprem",
            Self::Gcp => "gcp",
            Self::Aws => "aws",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(Self::Unspecified),
            "onprem" => Ok(Self::Onprem),
            "gcp" => Ok(Self::Gcp),
            "aws" => Ok(Self::Aws),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Platform providing the node identity.
    pub env: Environment,
    /// Organization placed in CSR subjects.
    pub organization: String,
    /// RSA modulus size for generated keys.
    pub rsa_key_size: usize,
    /// Requested certificate lifetime, in seconds.
    pub workload_cert_ttl_secs: u64,
    /// Authority address.
    pub authority_address: String,
    /// Delay before the first retry, in seconds.
    pub csr_initial_retry_interval_secs: u64,
    /// Failed attempts tolerated before the engine gives up.
    pub csr_max_retries: u32,
    /// Optional ceiling for the retry interval, in seconds.
    pub csr_max_retry_interval_secs: Option<u64>,
    /// Trusted root certificate for the authority connection.
    pub root_cert_file: PathBuf,
    /// Node private key.
    pub key_file: PathBuf,
    /// Node certificate chain.
    pub cert_chain_file: PathBuf,
    /// Workload socket layout.
    pub workload: WorkloadServerOptions,
    /// Management socket path.
    pub mgmt_socket: PathBuf,
    /// How long a workload removal waits for its server, in seconds.
    pub stop_timeout_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            organization: String::new(),
            rsa_key_size: DEFAULT_RSA_KEY_SIZE,
            workload_cert_ttl_secs: DEFAULT_WORKLOAD_CERT_TTL.as_secs(),
            authority_address: DEFAULT_AUTHORITY_ADDRESS.to_string(),
            csr_initial_retry_interval_secs: DEFAULT_CSR_INITIAL_RETRY_INTERVAL.as_secs(),
            csr_max_retries: DEFAULT_CSR_MAX_RETRIES,
            csr_max_retry_interval_secs: None,
            root_cert_file: PathBuf::from(DEFAULT_ROOT_CERT_FILE),
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            cert_chain_file: PathBuf::from(DEFAULT_CERT_CHAIN_FILE),
            workload: WorkloadServerOptions::default(),
            mgmt_socket: PathBuf::from(DEFAULT_MGMT_SOCKET),
            stop_timeout_secs: None,
        }
    }
}

impl AgentConfig {
    /// Reads and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed or
    /// validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the document is invalid.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would otherwise only fail at runtime.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.env != Environment::Onprem {
            return Err(ConfigError::UnsupportedEnvironment(self.env));
        }
        Endpoint::parse(&self.authority_address).map_err(ConfigError::AuthorityAddress)?;
        if self.csr_initial_retry_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "csr_initial_retry_interval_secs must be positive",
            ));
        }
        if self.workload_cert_ttl_secs < 60 {
            return Err(ConfigError::Invalid(
                "workload_cert_ttl_secs must be at least one minute",
            ));
        }
        if self.workload.path_prefix.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("workload.path_prefix must not be empty"));
        }
        Ok(())
    }

    /// Lifecycle engine settings.
    pub fn engine_config(&self) -> EngineConfig {
        let mut retry = RetryPolicy::new(
            Duration::from_secs(self.csr_initial_retry_interval_secs),
            self.csr_max_retries,
        );
        if let Some(max) = self.csr_max_retry_interval_secs {
            retry = retry.with_max_interval(Duration::from_secs(max));
        }
        EngineConfig {
            organization: self.organization.clone(),
            rsa_key_size: self.rsa_key_size,
            workload_cert_ttl: Duration::from_secs(self.workload_cert_ttl_secs),
            authority_address: self.authority_address.clone(),
            retry,
        }
    }

    /// Identity provider reading the configured node credential files.
    pub fn identity_provider(&self) -> OnPremIdentityProvider {
        OnPremIdentityProvider::new(&self.root_cert_file, &self.key_file, &self.cert_chain_file)
    }

    /// Secret sink rotating the configured node credential files in place.
    pub fn secret_sink(&self) -> FileSecretSink {
        FileSecretSink::new(&self.cert_chain_file, &self.key_file)
    }

    /// Empty registry with the configured socket layout and stop timeout.
    pub fn workload_registry(&self) -> WorkloadRegistry {
        let registry = WorkloadRegistry::new(self.workload.clone());
        match self.stop_timeout_secs {
            Some(secs) => registry.with_stop_timeout(Duration::from_secs(secs)),
            None => registry,
        }
    }
}
