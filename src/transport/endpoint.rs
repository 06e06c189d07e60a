//! Endpoint addresses.
//!
//! Accepted forms:
//!
//! - `unix:///path/to/socket` and the shorthand `unix:/path/to/socket`
//! - `tcp://host:port` and the shorthand `tcp:host:port`
//! - a bare `host:port`, e.g. `istio-ca:8060`
//!
//! Unlike Unix paths, TCP hosts may be DNS names.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

const TCP_SCHEME: &str = "tcp";
const UNIX_SCHEME: &str = "unix";

/// Parsed endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket.
    Unix(PathBuf),

    /// TCP endpoint.
    Tcp {
        /// DNS name or IP literal (IPv6 without brackets).
        host: String,
        /// TCP port.
        port: u16,
    },
}

/// Errors returned by [`Endpoint::parse`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointError {
    /// The address is empty.
    #[error("endpoint address is empty")]
    Empty,

    /// The input could not be parsed as a valid URI.
    #[error("endpoint address is not a valid URI")]
    Parse(#[from] url::ParseError),

    /// The URI scheme is not supported.
    #[error("endpoint address scheme must be unix: or tcp:")]
    InvalidScheme,

    /// User info, query or fragment present.
    #[error("endpoint address must not include user info, query values or a fragment")]
    UnexpectedComponent,

    /// Unix endpoints must not include an authority.
    #[error("unix: endpoint address must not include an authority")]
    UnixAuthorityNotAllowed,

    /// Unix endpoints must include an absolute path.
    #[error("unix: endpoint address must include an absolute path")]
    UnixMissingPath,

    /// TCP endpoints must include a host.
    #[error("tcp: endpoint address must include a host")]
    TcpMissingHost,

    /// TCP endpoints must include a port.
    #[error("tcp: endpoint address must include a port")]
    TcpMissingPort,

    /// TCP endpoints must not include a path.
    #[error("tcp: endpoint address must not include a path")]
    TcpUnexpectedPath,
}

impl Endpoint {
    /// Parses and validates an endpoint address.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] if the address does not match one of the
    /// accepted forms.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EndpointError::Empty);
        }

        let url = Url::parse(&normalize(input))?;
        if !url.username().is_empty()
            || url.password().is_some()
            || url.query().is_some()
            || url.fragment().is_some()
        {
            return Err(EndpointError::UnexpectedComponent);
        }

        match url.scheme() {
            UNIX_SCHEME => {
                if url.host_str().is_some_and(|h| !h.is_empty()) {
                    return Err(EndpointError::UnixAuthorityNotAllowed);
                }
                let path = url.path();
                if path.is_empty() || path == "/" || !path.starts_with('/') {
                    return Err(EndpointError::UnixMissingPath);
                }
                Ok(Self::Unix(PathBuf::from(path)))
            }
            TCP_SCHEME => {
                let host = match url.host() {
                    Some(url::Host::Domain(d)) if !d.is_empty() => d.to_owned(),
                    Some(url::Host::Ipv4(ip)) => ip.to_string(),
                    Some(url::Host::Ipv6(ip)) => ip.to_string(),
                    _ => return Err(EndpointError::TcpMissingHost),
                };
                let port = url.port().ok_or(EndpointError::TcpMissingPort)?;
                let path = url.path();
                if !path.is_empty() && path != "/" {
                    return Err(EndpointError::TcpUnexpectedPath);
                }
                Ok(Self::Tcp { host, port })
            }
            _ => Err(EndpointError::InvalidScheme),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp://[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

fn normalize(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("unix:") {
        if rest.starts_with('/') && !rest.starts_with("//") {
            return format!("unix://{rest}");
        }
        return input.to_owned();
    }
    if let Some(rest) = input.strip_prefix("tcp:") {
        if !rest.starts_with("//") {
            return format!("tcp://{rest}");
        }
        return input.to_owned();
    }
    if input.contains("://") {
        return input.to_owned();
    }
    format!("tcp://{input}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_host_port() {
        assert_eq!(
            Endpoint::parse("istio-ca:8060").unwrap(),
            Endpoint::Tcp {
                host: "istio-ca".into(),
                port: 8060
            }
        );
    }

    #[test]
    fn test_parse_unix_forms() {
        let expected = Endpoint::Unix(PathBuf::from("/tmp/ca.sock"));
        assert_eq!(Endpoint::parse("unix:///tmp/ca.sock").unwrap(), expected);
        assert_eq!(Endpoint::parse("unix:/tmp/ca.sock").unwrap(), expected);
    }

    #[test]
    fn test_parse_tcp_forms() {
        let expected = Endpoint::Tcp {
            host: "127.0.0.1".into(),
            port: 8081,
        };
        assert_eq!(Endpoint::parse("tcp://127.0.0.1:8081").unwrap(), expected);
        assert_eq!(Endpoint::parse("tcp:127.0.0.1:8081").unwrap(), expected);
        assert_eq!(Endpoint::parse("127.0.0.1:8081").unwrap(), expected);
    }

    #[test]
    fn test_parse_ipv6() {
        let ep = Endpoint::parse("[::1]:8060").unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: "::1".into(),
                port: 8060
            }
        );
        assert_eq!(ep.to_string(), "tcp://[::1]:8060");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Endpoint::parse("  "), Err(EndpointError::Empty));
        assert_eq!(Endpoint::parse("istio-ca"), Err(EndpointError::TcpMissingPort));
        assert_eq!(
            Endpoint::parse("http://istio-ca:8060"),
            Err(EndpointError::InvalidScheme)
        );
        assert_eq!(
            Endpoint::parse("unix://host/sock"),
            Err(EndpointError::UnixAuthorityNotAllowed)
        );
        assert_eq!(Endpoint::parse("unix:///"), Err(EndpointError::UnixMissingPath));
        assert_eq!(
            Endpoint::parse("tcp://1.2.3.4:80/path"),
            Err(EndpointError::TcpUnexpectedPath)
        );
        assert_eq!(
            Endpoint::parse("tcp://1.2.3.4:80?x=y"),
            Err(EndpointError::UnexpectedComponent)
        );
    }
}
