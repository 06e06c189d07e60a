//! Endpoint parsing and gRPC channel construction.
//!
//! Two kinds of peers are reached over gRPC: the certificate authority
//! (`host:port`, `tcp://host:port` or `unix:///path`) and, from tests and
//! tooling, the per-workload and management Unix sockets.

pub mod connector;
pub mod endpoint;
mod error;

pub use connector::{connect, connect_unix};
pub use endpoint::{Endpoint, EndpointError};
pub use error::TransportError;
