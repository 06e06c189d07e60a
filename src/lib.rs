#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Per-node mesh agent.
//!
//! The crate has two independent halves that only meet through the files the
//! first one writes:
//!
//! - [`lifecycle`]: the [`CertificateLifecycleEngine`] obtains the node
//!   identity certificate from a certificate authority and keeps renewing it,
//!   retrying failures with a doubling interval ([`retry`]).
//! - [`workload`]: the [`WorkloadRegistry`] runs one
//!   [`WorkloadCredentialServer`] per workload, each on its own Unix socket,
//!   and answers `Check` calls for callers the kernel can identify.
//!
//! The engine talks to the outside world only through collaborator traits
//! ([`IdentityProvider`], [`AuthorityClient`], [`SecretSink`], [`CertUtil`],
//! [`CsrGenerator`]); default implementations live in [`platform`],
//! [`authority`], [`secrets`] and [`cert`].
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use node_agent::{AgentConfig, WorkloadInfo};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgentConfig::default();
//! let registry = Arc::new(config.workload_registry());
//!
//! let path = registry.add(&WorkloadInfo::new("pod-uid", "reviews", "default", "reviews-sa"))?;
//! println!("workload socket at {}", path.display());
//!
//! registry.remove("pod-uid").await?;
//! # Ok(())
//! # }
//! ```

mod observability;
mod prelude;

pub mod authority;
pub mod cert;
pub mod config;
pub mod constants;
pub mod credential;
pub mod lifecycle;
pub mod platform;
pub mod proto;
pub mod retry;
pub mod secrets;
pub mod transport;
pub mod workload;

pub use authority::{AuthorityClient, AuthorityError, GrpcAuthorityClient};
pub use cert::{CertError, CertUtil, CsrError, CsrGenerator, RsaCsrGenerator, X509CertUtil};
pub use config::{AgentConfig, ConfigError, Environment};
pub use credential::{
    CsrArtifact, CsrRequest, Identity, IssuedCertificate, WorkloadAttributes, WorkloadCredentials,
    WorkloadInfo,
};
pub use lifecycle::{
    CertificateLifecycleEngine, EngineConfig, EngineState, EngineUpdates, LifecycleError,
};
pub use platform::{IdentityProvider, OnPremIdentityProvider, PlatformError};
pub use retry::{RetryPolicy, RetryState};
pub use secrets::{FileSecretSink, SecretError, SecretSink};
pub use workload::{
    CallerIdentity, PeerIdentityExtractor, RegistryError, ServeError, WorkloadCredentialServer,
    WorkloadRegistry, WorkloadServerOptions,
};
