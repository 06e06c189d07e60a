use std::fmt;
use tonic::transport::server::UdsConnectInfo;
use tonic::Extensions;

/// Local identity of the process on the other end of a workload socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Effective user id.
    pub uid: u32,
    /// Effective group id.
    pub gid: u32,
    /// Process id, when the platform reports it.
    pub pid: Option<i32>,
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid={} gid={}", self.uid, self.gid)?;
        if let Some(pid) = self.pid {
            write!(f, " pid={pid}")?;
        }
        Ok(())
    }
}

/// Resolves the caller of an RPC from its request extensions.
pub trait PeerIdentityExtractor: Send + Sync + 'static {
    /// Returns `None` when the caller cannot be identified.
    fn caller(&self, extensions: &Extensions) -> Option<CallerIdentity>;
}

/// Reads the `SO_PEERCRED` credentials tonic attaches to Unix socket
/// connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdsPeerCredentials;

impl PeerIdentityExtractor for UdsPeerCredentials {
    fn caller(&self, extensions: &Extensions) -> Option<CallerIdentity> {
        let cred = extensions.get::<UdsConnectInfo>()?.peer_cred?;
        Some(CallerIdentity {
            uid: cred.uid(),
            gid: cred.gid(),
            pid: cred.pid(),
        })
    }
}
