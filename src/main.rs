use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use node_agent::workload::mgmt::serve_management;
use node_agent::config::Environment;
use node_agent::{AgentConfig, CertificateLifecycleEngine, GrpcAuthorityClient};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "node-agent")]
#[command(about = "Node identity certificate rotation and per-workload credential sockets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, env = "NODE_AGENT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// JSON config file; when given, the per-command flags are ignored
    #[arg(long, global = true, env = "NODE_AGENT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Obtain and keep renewing the node identity certificate
    Run(RunArgs),

    /// Serve per-workload sockets driven by the management socket
    WorkloadApi(WorkloadApiArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Node environment: unspecified, onprem, gcp or aws (only onprem is supported)
    #[arg(long, env = "NODE_AGENT_ENV", default_value = "onprem")]
    env: Environment,

    /// Organization of the node identity
    #[arg(long, env = "NODE_AGENT_ORG", default_value = "")]
    org: String,

    /// Requested certificate lifetime in seconds
    #[arg(long, env = "NODE_AGENT_WORKLOAD_CERT_TTL", default_value_t = 19 * 60 * 60)]
    workload_cert_ttl: u64,

    /// RSA key size in bits
    #[arg(long, env = "NODE_AGENT_KEY_SIZE", default_value_t = 2048)]
    key_size: usize,

    /// Certificate authority address
    #[arg(long, env = "NODE_AGENT_CA_ADDRESS", default_value = "istio-ca:8060")]
    ca_address: String,

    /// Node certificate chain
    #[arg(long, env = "NODE_AGENT_CERT_CHAIN", default_value = "/etc/certs/cert-chain.pem")]
    cert_chain: PathBuf,

    /// Node private key
    #[arg(long, env = "NODE_AGENT_KEY", default_value = "/etc/certs/key.pem")]
    key: PathBuf,

    /// Root certificate of the certificate authority
    #[arg(long, env = "NODE_AGENT_ROOT_CERT", default_value = "/etc/certs/root-cert.pem")]
    root_cert: PathBuf,

    /// Initial retry interval in seconds
    #[arg(long, env = "NODE_AGENT_CSR_INITIAL_RETRY_INTERVAL", default_value_t = 1)]
    csr_initial_retry_interval: u64,

    /// Maximum number of retries before giving up
    #[arg(long, env = "NODE_AGENT_CSR_MAX_RETRIES", default_value_t = 10)]
    csr_max_retries: u32,
}

#[derive(Args)]
struct WorkloadApiArgs {
    /// Directory holding the per-workload sockets
    #[arg(long, env = "NODE_AGENT_WORKLOAD_PATH", default_value = "/tmp/nodeagent")]
    workload_path: PathBuf,

    /// Socket file name appended to <workload-path>/<uid>
    #[arg(long, env = "NODE_AGENT_SOCK_FILE", default_value = "/server.sock")]
    sock_file: String,

    /// Management socket receiving workload add/remove events
    #[arg(long, env = "NODE_AGENT_MGMT_SOCKET", default_value = "/tmp/udsuspver/mgmt.sock")]
    mgmt_socket: PathBuf,

    /// Seconds to wait for a workload server to stop before aborting it
    #[arg(long, env = "NODE_AGENT_STOP_TIMEOUT")]
    stop_timeout: Option<u64>,
}

impl RunArgs {
    fn apply(self, config: &mut AgentConfig) {
        config.env = self.env;
        config.organization = self.org;
        config.workload_cert_ttl_secs = self.workload_cert_ttl;
        config.rsa_key_size = self.key_size;
        config.authority_address = self.ca_address;
        config.cert_chain_file = self.cert_chain;
        config.key_file = self.key;
        config.root_cert_file = self.root_cert;
        config.csr_initial_retry_interval_secs = self.csr_initial_retry_interval;
        config.csr_max_retries = self.csr_max_retries;
    }
}

impl WorkloadApiArgs {
    fn apply(self, config: &mut AgentConfig) {
        config.workload.path_prefix = self.workload_path;
        config.workload.sock_file = self.sock_file;
        config.mgmt_socket = self.mgmt_socket;
        config.stop_timeout_secs = self.stop_timeout;
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(Clone, Copy)]
enum Mode {
    Run,
    WorkloadApi,
}

/// A config file replaces the per-command flags entirely.
fn load_config(cli: Cli) -> anyhow::Result<(AgentConfig, Mode)> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AgentConfig::default(),
    };
    let from_file = cli.config.is_some();

    let mode = match cli.command {
        Command::Run(args) => {
            if !from_file {
                args.apply(&mut config);
            }
            Mode::Run
        }
        Command::WorkloadApi(args) => {
            if !from_file {
                args.apply(&mut config);
            }
            Mode::WorkloadApi
        }
    };

    config.validate().context("invalid configuration")?;
    Ok((config, mode))
}

async fn run_engine(config: AgentConfig) -> anyhow::Result<()> {
    let engine = CertificateLifecycleEngine::builder()
        .config(config.engine_config())
        .identity_provider(Arc::new(config.identity_provider()))
        .authority(Arc::new(GrpcAuthorityClient::new()))
        .secret_sink(Arc::new(config.secret_sink()))
        .build()?;

    match engine.run().await {
        Ok(never) => match never {},
        Err(e) => Err(anyhow::Error::new(e).context("node agent terminated")),
    }
}

async fn run_workload_api(config: AgentConfig) -> anyhow::Result<()> {
    let registry = Arc::new(config.workload_registry());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: error={e}");
        }
        tracing::info!("Shutdown signal received");
    };

    let served = serve_management(Arc::clone(&registry), &config.mgmt_socket, shutdown).await;
    registry.shutdown().await;
    served.context("management server failed")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match load_config(cli) {
        Ok((config, Mode::Run)) => run_engine(config).await,
        Ok((config, Mode::WorkloadApi)) => run_workload_api(config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
