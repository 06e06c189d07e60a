//! Default values shared by the configuration types and the binary.

use std::time::Duration;

/// Default authority address (`host:port`).
pub const DEFAULT_AUTHORITY_ADDRESS: &str = "istio-ca:8060";

/// Default TTL requested for the node certificate.
pub const DEFAULT_WORKLOAD_CERT_TTL: Duration = Duration::from_secs(19 * 60 * 60);

/// Default RSA key size for generated private keys.
pub const DEFAULT_RSA_KEY_SIZE: usize = 2048;

/// Default delay before the first CSR retry.
pub const DEFAULT_CSR_INITIAL_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of failed CSR attempts tolerated before the engine gives up.
pub const DEFAULT_CSR_MAX_RETRIES: u32 = 10;

/// Default location of the node certificate chain.
pub const DEFAULT_CERT_CHAIN_FILE: &str = "/etc/certs/cert-chain.pem";

/// Default location of the node private key.
pub const DEFAULT_KEY_FILE: &str = "/etc/certs/key.pem";

/// Default location of the root certificate used to verify the authority.
pub const DEFAULT_ROOT_CERT_FILE: &str = "/etc/certs/root-cert.pem";

/// Directory under which per-workload sockets are created.
pub const DEFAULT_WORKLOAD_PATH_PREFIX: &str = "/tmp/nodeagent";

/// Suffix appended to `<prefix>/<uid>` to form a workload socket path.
pub const DEFAULT_WORKLOAD_SOCK_FILE: &str = "/server.sock";

/// How long a stopped workload server waits for open connections before
/// abandoning them.
pub const WORKLOAD_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Management socket receiving workload add/remove events.
pub const DEFAULT_MGMT_SOCKET: &str = "/tmp/udsuspver/mgmt.sock";

/// Credential type reported by the on-prem identity provider.
pub const ONPREM_CREDENTIAL_TYPE: &str = "onprem";
