//! gRPC channel construction over TCP (optionally mutual TLS) and Unix sockets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper_util::rt::TokioIo;
#[cfg(unix)]
use tokio::net::UnixStream;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint as TonicEndpoint, Identity, Uri};
use tower::service_fn;

use crate::platform::TransportCredentials;
use crate::transport::{Endpoint, TransportError};

const TONIC_DUMMY_URI: &str = "http://[::]:50051";

/// Connects to `endpoint`.
///
/// TCP connections use mutual TLS when `credentials` are supplied, and
/// plaintext otherwise. Unix socket connections are always plaintext.
///
/// # Errors
///
/// Returns [`TransportError`] if the endpoint cannot be reached or the TLS
/// configuration is rejected.
pub async fn connect(
    endpoint: &Endpoint,
    credentials: Option<&TransportCredentials>,
) -> Result<Channel, TransportError> {
    match endpoint {
        Endpoint::Unix(path) => connect_unix(path).await,
        Endpoint::Tcp { host, port } => connect_tcp(host, *port, credentials).await,
    }
}

async fn connect_tcp(
    host: &str,
    port: u16,
    credentials: Option<&TransportCredentials>,
) -> Result<Channel, TransportError> {
    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    let Some(creds) = credentials else {
        return Ok(TonicEndpoint::try_from(format!("http://{authority}"))?
            .connect()
            .await?);
    };

    let tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(&creds.root_cert_pem))
        .identity(Identity::from_pem(&creds.cert_chain_pem, creds.key_pem.as_slice()))
        .domain_name(host);

    Ok(TonicEndpoint::try_from(format!("https://{authority}"))?
        .tls_config(tls)?
        .connect()
        .await?)
}

/// Connects to a gRPC server listening on a Unix domain socket.
///
/// # Errors
///
/// Returns [`TransportError`] if the socket cannot be reached, or on
/// platforms without Unix domain sockets.
pub async fn connect_unix(path: &Path) -> Result<Channel, TransportError> {
    #[cfg(not(unix))]
    {
        let _ = path;
        return Err(TransportError::UnsupportedEndpointTransport { scheme: "unix" });
    }

    #[cfg(unix)]
    {
        let path: Arc<PathBuf> = Arc::new(path.to_path_buf());

        let channel = TonicEndpoint::try_from(TONIC_DUMMY_URI)?
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = Arc::clone(&path);
                async move {
                    let stream = UnixStream::connect(path.as_path()).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }))
            .await?;

        Ok(channel)
    }
}
