//! Node abstractions for cluster peers.
//!
//! Nodes describe the participants a transport can address: the coordinator
//! and the server/worker processes. They are identified by a compact
//! `NodeId` that is cheap to compare and hash.

use std::fmt;

/// Compact identifier for a node in the cluster.
///
/// Newtype over `i32` because ids travel on the wire as fixed-width signed
/// integers. `NodeId::EMPTY` means "not assigned" or "sender unknown" and
/// must never be confused with node 0.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub i32);

impl NodeId {
    /// Sentinel for an unassigned or unresolved id.
    pub const EMPTY: NodeId = NodeId(i32::MAX);

    #[inline]
    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("empty")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Role a process plays in the cluster.
///
/// Discriminants are the wire tags used by the codec.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Role {
    Server = 0,
    Worker = 1,
    Coordinator = 2,
}

impl Role {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Server),
            1 => Some(Self::Worker),
            2 => Some(Self::Coordinator),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Worker => "worker",
            Role::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical node participating in the cluster.
///
/// Keep this struct small and cheap to clone; sockets and channel state live
/// in the transport that talks to the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub role: Role,
    /// Hostname or IP address the node listens on.
    pub hostname: String,
    /// Listening port, or [`Node::EMPTY_PORT`] before the node has bound.
    pub port: i32,
    /// Set when a coordinator replays membership for a restarted node.
    pub is_recovery: bool,
}

impl Node {
    /// Sentinel for a port that has not been assigned yet.
    pub const EMPTY_PORT: i32 = i32::MAX;

    /// Construct a node that has no id yet.
    pub fn new(role: Role, hostname: impl Into<String>, port: i32) -> Self {
        Self {
            id: NodeId::EMPTY,
            role,
            hostname: hostname.into(),
            port,
            is_recovery: false,
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn has_port(&self) -> bool {
        self.port != Self::EMPTY_PORT && self.port >= 0
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[id={}]@{}:", self.role, self.id, self.hostname)?;
        if self.has_port() {
            write!(f, "{}", self.port)?;
        } else {
            f.write_str("?")?;
        }
        if self.is_recovery {
            f.write_str(" (recovery)")?;
        }
        Ok(())
    }
}
