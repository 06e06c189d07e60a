//! Per-workload credential sockets.
//!
//! Every registered workload gets its own Unix socket at
//! `<path_prefix>/<uid><sock_file>` served by a [`WorkloadCredentialServer`].
//! Callers are authenticated by the kernel-reported peer credentials of their
//! connection, never by a token. The [`WorkloadRegistry`] starts and stops
//! servers as workloads come and go, driven either directly or through the
//! `WorkloadManagement` gRPC service on a management socket (see [`mgmt`]).

mod error;
mod lifecycle;
pub mod mgmt;
mod peer;
mod registry;
mod server;
mod service;

pub use error::{RegistryError, ServeError};
pub use lifecycle::ServerState;
pub use peer::{CallerIdentity, PeerIdentityExtractor, UdsPeerCredentials};
pub use registry::WorkloadRegistry;
pub use server::{WorkloadCredentialServer, WorkloadServerOptions};
