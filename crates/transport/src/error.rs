//! Error types for the transport.

use std::io;

use corelib::{CodecError, NodeId};
use thiserror::Error;

/// Result type alias for the transport.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors returned by transport operations.
///
/// [`TransportError::is_fatal`] separates setup failures the process cannot
/// continue after from per-call failures the caller may retry.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Context or socket could not be created
    #[error("transport setup failed: {0}")]
    Setup(String),
    /// Operation issued before `start`
    #[error("transport not started")]
    NotStarted,
    /// `start` issued twice
    #[error("transport already started")]
    AlreadyStarted,
    /// `receive` issued before `bind`
    #[error("transport has no receiving socket, bind first")]
    NotBound,
    /// Every bind attempt failed
    #[error("bind failed after {attempts} attempts")]
    BindExhausted { attempts: usize },
    /// Outbound channel could not be created
    #[error("connect to {addr} failed: {source}. it often can be solved by raising the open file limit (ulimit -n)")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// No outbound channel for the target node
    #[error("there is no socket to node {0}")]
    NoChannel(NodeId),
    /// Send failed on the wire
    #[error("failed to send message to node {node}: {source}")]
    Send {
        node: NodeId,
        #[source]
        source: io::Error,
    },
    /// Receive failed on the wire
    #[error("failed to receive message: {0}")]
    Recv(#[source] io::Error),
    /// Peer violated the framing protocol
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// Meta could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Invalid node or message handed in by the caller
    #[error(transparent)]
    Core(#[from] corelib::Error),
    /// Transport was stopped while the call was pending
    #[error("transport closed")]
    Closed,
    /// Bad configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// True for failures after which the node cannot keep its place in the
    /// cluster.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Setup(_) | TransportError::Connect { .. })
    }
}
