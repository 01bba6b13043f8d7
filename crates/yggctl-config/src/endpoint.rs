//! Admin channel locations.
//!
//! The daemon's `AdminListen` setting accepts either a Unix socket
//! (`unix:///var/run/yggdrasil/yggdrasil.sock`) or a TCP address
//! (`tcp://localhost:9001`). A bare absolute path is treated as a Unix socket.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default admin channel location used when nothing else is configured.
pub const DEFAULT_ADMIN_ENDPOINT: &str = "unix:///var/run/yggdrasil/yggdrasil.sock";

/// Where the daemon's administrative channel lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminEndpoint {
    /// Unix domain socket at the given path.
    Unix(PathBuf),
    /// TCP `host:port` pair.
    Tcp(String),
}

/// Error returned when an endpoint string cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid admin endpoint {input:?}: {reason}")]
pub struct EndpointParseError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for AdminEndpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let err = |reason| EndpointParseError {
            input: s.to_string(),
            reason,
        };

        if let Some(path) = input.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(err("missing socket path"));
            }
            return Ok(AdminEndpoint::Unix(PathBuf::from(path)));
        }

        if let Some(addr) = input.strip_prefix("tcp://") {
            let (host, port) = addr.rsplit_once(':').ok_or_else(|| err("missing port"))?;
            if host.is_empty() {
                return Err(err("missing host"));
            }
            port.parse::<u16>().map_err(|_| err("port is not a number"))?;
            return Ok(AdminEndpoint::Tcp(addr.to_string()));
        }

        if input.starts_with('/') {
            return Ok(AdminEndpoint::Unix(PathBuf::from(input)));
        }

        Err(err("expected unix://, tcp://, or an absolute socket path"))
    }
}

impl fmt::Display for AdminEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminEndpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            AdminEndpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_unix_url() {
        let ep: AdminEndpoint = "unix:///run/ygg.sock".parse().unwrap();
        assert_eq!(ep, AdminEndpoint::Unix(PathBuf::from("/run/ygg.sock")));
        assert_eq!(ep.to_string(), "unix:///run/ygg.sock");
    }

    #[test]
    fn test_parse_bare_path() {
        let ep: AdminEndpoint = "/var/run/yggdrasil/yggdrasil.sock".parse().unwrap();
        assert_eq!(
            ep,
            AdminEndpoint::Unix(PathBuf::from("/var/run/yggdrasil/yggdrasil.sock"))
        );
    }

    #[test]
    fn test_parse_tcp() {
        let ep: AdminEndpoint = "tcp://[::1]:9001".parse().unwrap();
        assert_eq!(ep, AdminEndpoint::Tcp("[::1]:9001".to_string()));
    }

    #[test]
    fn test_default_endpoint_parses() {
        assert!(DEFAULT_ADMIN_ENDPOINT.parse::<AdminEndpoint>().is_ok());
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!("tcp://localhost".parse::<AdminEndpoint>().is_err());
        assert!("tcp://:9001".parse::<AdminEndpoint>().is_err());
        assert!("tcp://host:http".parse::<AdminEndpoint>().is_err());
        assert!("unix://".parse::<AdminEndpoint>().is_err());
        assert!("none".parse::<AdminEndpoint>().is_err());
    }
}
