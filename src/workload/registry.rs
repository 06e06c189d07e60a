use super::server::{WorkloadCredentialServer, WorkloadServerOptions};
use super::{PeerIdentityExtractor, RegistryError};
use crate::credential::WorkloadInfo;
use crate::prelude::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Entry {
    server: Arc<WorkloadCredentialServer>,
    task: JoinHandle<()>,
    removing: bool,
}

/// Tracks one [`WorkloadCredentialServer`] per workload UID.
///
/// `add` and `remove` for distinct UIDs do not wait on each other; the map
/// lock is only held for lookups and updates, never across an await.
/// Must be used from within a Tokio runtime.
pub struct WorkloadRegistry {
    options: WorkloadServerOptions,
    stop_timeout: Option<Duration>,
    extractor: Option<Arc<dyn PeerIdentityExtractor>>,
    servers: Mutex<HashMap<String, Entry>>,
}

impl std::fmt::Debug for WorkloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadRegistry")
            .field("options", &self.options)
            .field("stop_timeout", &self.stop_timeout)
            .field("workloads", &self.len())
            .finish_non_exhaustive()
    }
}

impl WorkloadRegistry {
    /// Creates an empty registry. Removals wait indefinitely for servers to
    /// stop unless [`with_stop_timeout`](Self::with_stop_timeout) is set.
    pub fn new(options: WorkloadServerOptions) -> Self {
        Self {
            options,
            stop_timeout: None,
            extractor: None,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Bounds how long [`remove`](Self::remove) waits for a server to close.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    /// Uses `extractor` to resolve callers on every server created from now on.
    #[must_use]
    pub fn with_peer_extractor(mut self, extractor: Arc<dyn PeerIdentityExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Socket options used for new servers.
    pub fn options(&self) -> &WorkloadServerOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Entries stay consistent even if a holder panicked: every critical
        // section is a single map operation.
        self.servers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Starts serving a socket for the workload in `info`.
    ///
    /// Returns the socket path. The server is spawned and binds
    /// asynchronously; bind failures are logged by the server.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidUid`] for UIDs that would escape the
    /// socket directory, and [`RegistryError::Duplicate`] if the UID is
    /// already registered or still being removed.
    pub fn add(&self, info: &WorkloadInfo) -> Result<PathBuf, RegistryError> {
        let uid = info.attrs.uid.as_str();
        validate_uid(uid)?;

        let mut servers = self.lock();
        if servers.contains_key(uid) {
            warn!("Workload already registered: uid={uid}");
            return Err(RegistryError::Duplicate(uid.to_string()));
        }

        let mut server = WorkloadCredentialServer::new(info, &self.options);
        if let Some(extractor) = &self.extractor {
            server = server.with_peer_extractor(Arc::clone(extractor));
        }
        let server = Arc::new(server);
        let path = server.socket_path().to_path_buf();

        let task = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                if let Err(e) = server.serve().await {
                    error!(
                        "Workload server exited with error: uid={}, error={e}",
                        server.credentials().uid
                    );
                }
            }
        });

        servers.insert(
            uid.to_string(),
            Entry {
                server,
                task,
                removing: false,
            },
        );
        info!("Workload added: uid={uid}, path={}", path.display());
        Ok(path)
    }

    /// Stops the workload's server, waits for its listener to close and
    /// forgets the UID.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown UIDs,
    /// [`RegistryError::AlreadyRemoving`] while another removal of the same
    /// UID is in progress, and [`RegistryError::StopTimeout`] if the server
    /// did not close within the stop timeout. In the last case the serve task
    /// is aborted and the UID is forgotten anyway.
    pub async fn remove(&self, uid: &str) -> Result<(), RegistryError> {
        let server = {
            let mut servers = self.lock();
            let entry = servers
                .get_mut(uid)
                .ok_or_else(|| RegistryError::NotFound(uid.to_string()))?;
            if entry.removing {
                return Err(RegistryError::AlreadyRemoving(uid.to_string()));
            }
            entry.removing = true;
            Arc::clone(&entry.server)
        };

        server.stop();

        let timed_out = match self.stop_timeout {
            Some(timeout) => tokio::time::timeout(timeout, server.wait_done())
                .await
                .is_err(),
            None => {
                server.wait_done().await;
                false
            }
        };

        let entry = self.lock().remove(uid);

        if timed_out {
            if let Some(entry) = entry {
                entry.task.abort();
            }
            super::server::remove_workload_socket(server.socket_path());
            let timeout = self.stop_timeout.unwrap_or_default();
            error!("Workload server did not stop in time: uid={uid}, timeout={timeout:?}");
            return Err(RegistryError::StopTimeout {
                uid: uid.to_string(),
                timeout,
            });
        }

        info!("Workload removed: uid={uid}");
        Ok(())
    }

    /// Removes every registered workload, logging individual failures.
    pub async fn shutdown(&self) {
        let uids: Vec<String> = self.lock().keys().cloned().collect();
        debug!("Shutting down workload registry: workloads={}", uids.len());
        for uid in uids {
            match self.remove(&uid).await {
                Ok(()) | Err(RegistryError::NotFound(_) | RegistryError::AlreadyRemoving(_)) => {}
                Err(e) => warn!("Failed to remove workload during shutdown: uid={uid}, error={e}"),
            }
        }
    }

    /// Whether `uid` is registered (including while it is being removed).
    pub fn contains(&self, uid: &str) -> bool {
        self.lock().contains_key(uid)
    }

    /// Number of registered workloads.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no workload is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Socket path of a registered workload.
    pub fn socket_path(&self, uid: &str) -> Option<PathBuf> {
        self.lock()
            .get(uid)
            .map(|e| e.server.socket_path().to_path_buf())
    }

    /// Server of a registered workload.
    pub fn server(&self, uid: &str) -> Option<Arc<WorkloadCredentialServer>> {
        self.lock().get(uid).map(|e| Arc::clone(&e.server))
    }
}

fn validate_uid(uid: &str) -> Result<(), RegistryError> {
    if uid.is_empty() || uid == "." || uid == ".." || uid.contains('/') || uid.contains('\0') {
        return Err(RegistryError::InvalidUid(uid.to_string()));
    }
    Ok(())
}
