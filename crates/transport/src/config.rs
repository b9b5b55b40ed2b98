//! Transport configuration.

use std::env;

use crate::error::{Result, TransportError};

/// Environment variable selecting local (Unix socket) addressing.
pub const LOCAL_ENV: &str = "PS_LOCAL";

/// Rendezvous group joined by every multicast receiver.
pub const DEFAULT_GROUP: &str = "PS";

/// Settings shared by both bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Use `ipc:///tmp/<port>` instead of network addresses.
    pub local: bool,
    /// Upper bound on sockets owned by one transport context.
    pub max_sockets: usize,
    /// Rendezvous group for the multicast binding.
    pub group: String,
    /// Transmission rate hint for multicast channels, in kbit/s.
    pub multicast_rate: u32,
    /// Largest frame accepted on a reliable channel.
    pub max_frame_len: usize,
    /// Largest datagram the multicast binding sends or receives.
    pub max_datagram_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            local: false,
            max_sockets: 65536,
            group: DEFAULT_GROUP.to_string(),
            multicast_rate: 4000,
            max_frame_len: 1 << 30,
            max_datagram_len: 65507,
        }
    }
}

impl TransportConfig {
    /// Defaults, with local mode taken from [`LOCAL_ENV`].
    pub fn from_env() -> Result<Self> {
        let local = match env::var(LOCAL_ENV) {
            Ok(v) => parse_bool(&v).ok_or_else(|| {
                TransportError::Config(format!("{LOCAL_ENV}={v:?} is not a boolean"))
            })?,
            Err(env::VarError::NotPresent) => false,
            Err(e) => return Err(TransportError::Config(format!("{LOCAL_ENV}: {e}"))),
        };
        Ok(Self {
            local,
            ..Self::default()
        })
    }

    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn max_sockets(mut self, max_sockets: usize) -> Self {
        self.max_sockets = max_sockets;
        self
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Some(false),
        "1" | "true" | "yes" | "on" => Some(true),
        _ => None,
    }
}
