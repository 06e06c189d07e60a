//! Certificate lifecycle engine.
//!
//! The engine owns the node identity certificate: it generates a CSR, has it
//! signed by the authority, persists the result and sleeps until the
//! certificate is due for renewal. Failed attempts are retried with a doubling
//! interval until the [`RetryPolicy`](crate::retry::RetryPolicy) is exhausted.
//!
//! ```no_run
//! use std::sync::Arc;
//! use node_agent::authority::GrpcAuthorityClient;
//! use node_agent::lifecycle::{CertificateLifecycleEngine, EngineConfig};
//! use node_agent::platform::OnPremIdentityProvider;
//! use node_agent::secrets::FileSecretSink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = CertificateLifecycleEngine::builder()
//!     .config(EngineConfig::default())
//!     .identity_provider(Arc::new(OnPremIdentityProvider::new(
//!         "/etc/certs/root-cert.pem",
//!         "/etc/certs/key.pem",
//!         "/etc/certs/cert-chain.pem",
//!     )))
//!     .authority(Arc::new(GrpcAuthorityClient::new()))
//!     .secret_sink(Arc::new(FileSecretSink::new(
//!         "/etc/certs/cert-chain.pem",
//!         "/etc/certs/key.pem",
//!     )))
//!     .build()?;
//!
//! // Only returns on a terminal failure.
//! let err = engine.run().await.unwrap_err();
//! eprintln!("engine terminated: {err}");
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod engine;
mod error;
mod state;

pub use builder::CertificateLifecycleEngineBuilder;
pub use config::EngineConfig;
pub use engine::CertificateLifecycleEngine;
pub use error::{AttemptFailure, LifecycleError};
pub use state::{EngineState, EngineUpdates};
