//! Generated protobuf and gRPC bindings for `nodeagent.v1`.

#![allow(missing_docs, clippy::all, clippy::pedantic)]

pub mod nodeagent {
    pub mod v1 {
        tonic::include_proto!("nodeagent.v1");
    }
}

pub use nodeagent::v1::*;
