use super::lifecycle::{ServerLifecycle, ServerState};
use super::peer::{CallerIdentity, PeerIdentityExtractor, UdsPeerCredentials};
use super::service::{check_response, WorkloadCheckService};
use super::ServeError;
use crate::constants::{
    DEFAULT_WORKLOAD_PATH_PREFIX, DEFAULT_WORKLOAD_SOCK_FILE, WORKLOAD_DRAIN_TIMEOUT,
};
use crate::credential::{WorkloadCredentials, WorkloadInfo};
use crate::prelude::{debug, error, info, warn};
use crate::proto::workload_service_server::WorkloadServiceServer;
use crate::proto::CheckResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;

/// Where workload sockets are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadServerOptions {
    /// Directory holding one entry per workload UID.
    pub path_prefix: PathBuf,
    /// Appended to `<path_prefix>/<uid>`; normally starts with `/`.
    pub sock_file: String,
}

impl Default for WorkloadServerOptions {
    fn default() -> Self {
        Self {
            path_prefix: PathBuf::from(DEFAULT_WORKLOAD_PATH_PREFIX),
            sock_file: DEFAULT_WORKLOAD_SOCK_FILE.to_string(),
        }
    }
}

impl WorkloadServerOptions {
    /// Socket path for `uid`: `<path_prefix>/<uid><sock_file>`.
    pub fn socket_path(&self, uid: &str) -> PathBuf {
        let mut path = self.path_prefix.clone().into_os_string();
        path.push("/");
        path.push(uid);
        path.push(&self.sock_file);
        PathBuf::from(path)
    }
}

/// Serves `WorkloadService` on one workload's Unix socket.
///
/// The server is a lifecycle object: [`serve`](Self::serve) runs until
/// [`stop`](Self::stop) is called from any task, and
/// [`wait_done`](Self::wait_done) resolves once the listener is closed and
/// the socket file removed. Connections still open
/// [`WORKLOAD_DRAIN_TIMEOUT`] after the stop are abandoned.
pub struct WorkloadCredentialServer {
    creds: Arc<WorkloadCredentials>,
    path: PathBuf,
    extractor: Arc<dyn PeerIdentityExtractor>,
    lifecycle: ServerLifecycle,
}

impl fmt::Debug for WorkloadCredentialServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadCredentialServer")
            .field("uid", &self.creds.uid)
            .field("path", &self.path)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl WorkloadCredentialServer {
    /// Creates a server for the workload described by `info`. Nothing is
    /// bound until [`serve`](Self::serve).
    pub fn new(info: &WorkloadInfo, options: &WorkloadServerOptions) -> Self {
        Self {
            creds: Arc::new(WorkloadCredentials::from(info)),
            path: options.socket_path(&info.attrs.uid),
            extractor: Arc::new(UdsPeerCredentials),
            lifecycle: ServerLifecycle::new(),
        }
    }

    /// Replaces the caller resolution used by `Check`.
    #[must_use]
    pub fn with_peer_extractor(mut self, extractor: Arc<dyn PeerIdentityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Credentials of the workload this socket belongs to.
    pub fn credentials(&self) -> &WorkloadCredentials {
        &self.creds
    }

    /// Path of the workload socket.
    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    /// Binds the socket and serves until stopped.
    ///
    /// A stale file at the socket path is removed first and the parent
    /// directory is created when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError`] if the server was already started or stopped,
    /// if the socket cannot be prepared or bound (the server can then be
    /// served again), or if the gRPC server fails.
    pub async fn serve(&self) -> Result<(), ServeError> {
        self.lifecycle.begin_serve()?;

        let listener = match self.bind() {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind workload socket: uid={}, error={e}", self.creds.uid);
                self.lifecycle.bind_failed();
                return Err(e);
            }
        };

        let (closed_tx, closed_rx) = oneshot::channel::<()>();
        let stop = self.lifecycle.stop_token();
        let closer_path = self.path.clone();
        let closer = tokio::spawn(async move {
            stop.cancelled().await;
            debug!("Closing workload listener: path={}", closer_path.display());
            let _ = closed_tx.send(());
        });

        info!(
            "Workload socket listening: uid={}, path={}",
            self.creds.uid,
            self.path.display()
        );

        let service = WorkloadCheckService {
            creds: Arc::clone(&self.creds),
            extractor: Arc::clone(&self.extractor),
        };
        let server = Server::builder()
            .add_service(WorkloadServiceServer::new(service))
            .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async {
                let _ = closed_rx.await;
            });
        let drain = self.lifecycle.stop_token();
        let result = tokio::select! {
            result = server => result.map_err(ServeError::from),
            () = async move {
                drain.cancelled().await;
                tokio::time::sleep(WORKLOAD_DRAIN_TIMEOUT).await;
            } => {
                warn!(
                    "Abandoning open workload connections after {:?}: uid={}",
                    WORKLOAD_DRAIN_TIMEOUT, self.creds.uid
                );
                Ok(())
            }
        };

        closer.abort();
        remove_workload_socket(&self.path);
        self.lifecycle.finish();
        info!("Closed the listener: uid={}", self.creds.uid);

        result
    }

    fn bind(&self) -> Result<UnixListener, ServeError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ServeError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        remove_stale(&self.path).map_err(|source| ServeError::RemoveStale {
            path: self.path.clone(),
            source,
        })?;

        UnixListener::bind(&self.path).map_err(|source| ServeError::Bind {
            path: self.path.clone(),
            source,
        })
    }

    /// Requests the listener to close. Idempotent and non-blocking.
    ///
    /// Stopping a server that never served marks it done immediately; a
    /// later [`serve`](Self::serve) returns [`ServeError::Stopped`].
    pub fn stop(&self) {
        if self.lifecycle.stop() {
            debug!("Workload server stop requested: uid={}", self.creds.uid);
        }
    }

    /// Resolves once the listener is closed. Any number of tasks may wait.
    pub async fn wait_done(&self) {
        self.lifecycle.wait_done().await;
    }

    /// Whether the listener has closed.
    pub fn is_done(&self) -> bool {
        self.lifecycle.is_done()
    }

    /// The `Check` answer for a connection from `caller`.
    pub fn check(&self, caller: Option<&CallerIdentity>) -> CheckResponse {
        check_response(&self.creds, caller)
    }
}

pub(super) fn remove_stale(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub(super) fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove socket: path={}, error={e}", path.display()),
    }
}

/// Removes a workload socket and its UID directory, if that is now empty.
pub(super) fn remove_workload_socket(path: &Path) {
    remove_socket(path);
    let Some(dir) = path.parent() else {
        return;
    };
    match std::fs::remove_dir(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => debug!("Keeping workload directory: path={}, error={e}", dir.display()),
    }
}
