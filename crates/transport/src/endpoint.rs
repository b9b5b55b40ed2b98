//! Socket addresses in `scheme://host:port` form.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Directory holding local-mode socket files.
pub const IPC_DIR: &str = "/tmp";

/// Network scheme used by a binding when not in local mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Udp,
}

/// Where a socket binds or connects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Udp { host: String, port: u16 },
    Ipc { path: PathBuf },
}

impl Endpoint {
    /// Wildcard listening address for `port`.
    pub fn bind(scheme: Scheme, port: u16, local: bool) -> Self {
        Self::connect(scheme, "*", port, local)
    }

    /// Address of a peer listening on `host:port`.
    pub fn connect(scheme: Scheme, host: &str, port: u16, local: bool) -> Self {
        if local {
            return Endpoint::Ipc {
                path: PathBuf::from(format!("{IPC_DIR}/{port}")),
            };
        }
        let host = host.to_string();
        match scheme {
            Scheme::Tcp => Endpoint::Tcp { host, port },
            Scheme::Udp => Endpoint::Udp { host, port },
        }
    }

    /// `host:port` suitable for the OS resolver, with `*` as the wildcard.
    pub(crate) fn socket_addr(&self) -> Option<(String, u16)> {
        match self {
            Endpoint::Tcp { host, port } | Endpoint::Udp { host, port } => {
                let host = if host == "*" { "0.0.0.0" } else { host.as_str() };
                Some((host.to_string(), *port))
            }
            Endpoint::Ipc { .. } => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Endpoint::Udp { host, port } => write!(f, "udp://{host}:{port}"),
            Endpoint::Ipc { path } => write!(f, "ipc://{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TransportError::Config(format!("invalid endpoint {s:?}"));
        let (scheme, rest) = s.split_once("://").ok_or_else(bad)?;
        if scheme == "ipc" {
            if rest.is_empty() {
                return Err(bad());
            }
            return Ok(Endpoint::Ipc {
                path: PathBuf::from(rest),
            });
        }
        let (host, port) = rest.rsplit_once(':').ok_or_else(bad)?;
        let port: u16 = port.parse().map_err(|_| bad())?;
        if host.is_empty() {
            return Err(bad());
        }
        let host = host.to_string();
        match scheme {
            "tcp" => Ok(Endpoint::Tcp { host, port }),
            "udp" => Ok(Endpoint::Udp { host, port }),
            _ => Err(bad()),
        }
    }
}
