//! `WorkloadManagement` gRPC service: workload add/remove events delivered
//! over a management Unix socket.
//!
//! | outcome                         | status code           |
//! |---------------------------------|-----------------------|
//! | success                         | `OK`                  |
//! | missing attributes, invalid UID | `INVALID_ARGUMENT`    |
//! | UID already registered          | `ALREADY_EXISTS`      |
//! | UID unknown                     | `NOT_FOUND`           |
//! | server did not stop in time     | `DEADLINE_EXCEEDED`   |
//! | removal already in progress     | `INTERNAL`            |
//!
//! Outcomes are reported in the response body; the RPC itself succeeds.

use super::server::{remove_socket, remove_stale};
use super::{RegistryError, ServeError, WorkloadRegistry};
use crate::credential::{WorkloadAttributes, WorkloadInfo};
use crate::prelude::{debug, error, info};
use crate::proto;
use crate::proto::workload_management_server::{WorkloadManagement, WorkloadManagementServer};
use crate::proto::{ManagementResponse, RpcStatus};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status};

/// `WorkloadManagement` implementation driving a [`WorkloadRegistry`].
#[derive(Debug, Clone)]
pub struct WorkloadManagementService {
    registry: Arc<WorkloadRegistry>,
}

impl WorkloadManagementService {
    /// Wraps `registry`.
    pub fn new(registry: Arc<WorkloadRegistry>) -> Self {
        Self { registry }
    }

    /// Handles an add event.
    pub fn add(&self, info: Option<WorkloadInfo>) -> RpcStatus {
        let Some(info) = info else {
            return invalid_attrs();
        };
        match self.registry.add(&info) {
            Ok(path) => ok(format!("workload {} listening on {}", info.attrs.uid, path.display())),
            Err(e) => registry_status(&e),
        }
    }

    /// Handles a remove event.
    pub async fn remove(&self, info: Option<WorkloadInfo>) -> RpcStatus {
        let Some(info) = info else {
            return invalid_attrs();
        };
        match self.registry.remove(&info.attrs.uid).await {
            Ok(()) => ok(format!("workload {} removed", info.attrs.uid)),
            Err(e) => registry_status(&e),
        }
    }
}

fn ok(message: String) -> RpcStatus {
    RpcStatus {
        code: Code::Ok as i32,
        message,
    }
}

fn invalid_attrs() -> RpcStatus {
    RpcStatus {
        code: Code::InvalidArgument as i32,
        message: "workload attributes are missing".to_string(),
    }
}

fn registry_status(err: &RegistryError) -> RpcStatus {
    let code = match err {
        RegistryError::InvalidUid(_) => Code::InvalidArgument,
        RegistryError::Duplicate(_) => Code::AlreadyExists,
        RegistryError::NotFound(_) => Code::NotFound,
        RegistryError::StopTimeout { .. } => Code::DeadlineExceeded,
        RegistryError::AlreadyRemoving(_) => Code::Internal,
    };
    RpcStatus {
        code: code as i32,
        message: err.to_string(),
    }
}

fn from_proto(info: proto::WorkloadInfo) -> Option<WorkloadInfo> {
    let attrs = info.attrs?;
    Some(WorkloadInfo {
        attrs: WorkloadAttributes {
            uid: attrs.uid,
            workload: attrs.workload,
            namespace: attrs.namespace,
            service_account: attrs.service_account,
        },
        workload_path: info.workload_path,
    })
}

#[tonic::async_trait]
impl WorkloadManagement for WorkloadManagementService {
    async fn add_listener(
        &self,
        request: Request<proto::WorkloadInfo>,
    ) -> Result<Response<ManagementResponse>, Status> {
        let status = self.add(from_proto(request.into_inner()));
        debug!("AddListener handled: code={}", status.code);
        Ok(Response::new(ManagementResponse {
            status: Some(status),
        }))
    }

    async fn del_listener(
        &self,
        request: Request<proto::WorkloadInfo>,
    ) -> Result<Response<ManagementResponse>, Status> {
        let status = self.remove(from_proto(request.into_inner())).await;
        debug!("DelListener handled: code={}", status.code);
        Ok(Response::new(ManagementResponse {
            status: Some(status),
        }))
    }
}

/// Serves `WorkloadManagement` for `registry` on the Unix socket at `path`
/// until `shutdown` resolves. The socket is prepared like a workload socket:
/// parent directory created, stale file removed, file removed on exit.
///
/// # Errors
///
/// Returns [`ServeError`] if the socket cannot be prepared or bound, or if
/// the gRPC server fails.
pub async fn serve_management<F>(
    registry: Arc<WorkloadRegistry>,
    path: &Path,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ServeError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    remove_stale(path).map_err(|source| ServeError::RemoveStale {
        path: path.to_path_buf(),
        source,
    })?;
    let listener = UnixListener::bind(path).map_err(|source| ServeError::Bind {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Management socket listening: path={}", path.display());
    let result = Server::builder()
        .add_service(WorkloadManagementServer::new(WorkloadManagementService::new(
            registry,
        )))
        .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
        .await;
    remove_socket(path);

    if let Err(e) = &result {
        error!("Management server failed: error={e}");
    }
    result.map_err(ServeError::from)
}
