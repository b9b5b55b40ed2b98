//! The transport contract and the closed set of bindings implementing it.

use async_trait::async_trait;
use corelib::{Message, Node, NodeId};

use crate::config::TransportConfig;
use crate::error::Result;
use crate::multicast::MulticastBinding;
use crate::reliable::ReliableBinding;

/// Uniform way for a node to reach its peers.
///
/// Lifecycle: [`start`](Transport::start), [`bind`](Transport::bind) and
/// [`connect`](Transport::connect) to each peer, then any number of
/// [`send`](Transport::send) / [`receive`](Transport::receive) calls, and
/// finally [`stop`](Transport::stop). Every other operation fails with
/// [`TransportError::NotStarted`](crate::TransportError::NotStarted) outside
/// of `start`..`stop`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create the transport context.
    async fn start(&self) -> Result<()>;

    /// Shut down: unblock pending calls, discard unsent data, close every
    /// socket and release the context.
    async fn stop(&self) -> Result<()>;

    /// Claim a receiving socket for `node`.
    ///
    /// # Arguments
    ///
    /// * `node` - Node whose port is tried first. An unassigned port lets
    ///   the OS pick one.
    /// * `max_retry` - Number of fallback ports tried after the first.
    ///
    /// # Returns
    ///
    /// The port actually bound, which is also recorded on the local node.
    async fn bind(&self, node: &Node, max_retry: usize) -> Result<u16>;

    /// Open an outbound channel to `node`, replacing any existing one.
    /// Peers sharing our role (other than ourselves) are skipped.
    async fn connect(&self, node: &Node) -> Result<()>;

    /// Send `msg` to `msg.meta.receiver`, returning the bytes put on the wire.
    async fn send(&self, msg: Message) -> Result<usize>;

    /// Wait for the next message from any peer.
    async fn receive(&self) -> Result<Message>;

    fn local_node(&self) -> Node;

    /// Replace the local node, typically once the coordinator assigned an id.
    fn set_local_node(&self, node: Node);

    /// Short binding name used in logs and metric labels.
    fn name(&self) -> &'static str;
}

/// Channel discipline of a [`Van`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    /// Multi-frame messages over streams.
    Reliable,
    /// One datagram per message, group-tagged.
    Multicast,
}

impl std::str::FromStr for BindingKind {
    type Err = crate::TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reliable" | "tcp" => Ok(BindingKind::Reliable),
            "multicast" | "udp" => Ok(BindingKind::Multicast),
            _ => Err(crate::TransportError::Config(format!(
                "unknown binding {s:?}"
            ))),
        }
    }
}

/// A transport with its binding chosen at construction.
pub enum Van {
    Reliable(ReliableBinding),
    Multicast(MulticastBinding),
}

impl Van {
    pub fn new(kind: BindingKind, my_node: Node, config: TransportConfig) -> Self {
        match kind {
            BindingKind::Reliable => Van::Reliable(ReliableBinding::new(my_node, config)),
            BindingKind::Multicast => Van::Multicast(MulticastBinding::new(my_node, config)),
        }
    }

    pub fn kind(&self) -> BindingKind {
        match self {
            Van::Reliable(_) => BindingKind::Reliable,
            Van::Multicast(_) => BindingKind::Multicast,
        }
    }

    /// Ids with an open outbound channel, sorted.
    pub async fn connected_peers(&self) -> Vec<NodeId> {
        match self {
            Van::Reliable(b) => b.connected_peers().await,
            Van::Multicast(b) => b.connected_peers().await,
        }
    }

    fn inner(&self) -> &dyn Transport {
        match self {
            Van::Reliable(b) => b,
            Van::Multicast(b) => b,
        }
    }
}

#[async_trait]
impl Transport for Van {
    async fn start(&self) -> Result<()> {
        self.inner().start().await
    }

    async fn stop(&self) -> Result<()> {
        self.inner().stop().await
    }

    async fn bind(&self, node: &Node, max_retry: usize) -> Result<u16> {
        self.inner().bind(node, max_retry).await
    }

    async fn connect(&self, node: &Node) -> Result<()> {
        self.inner().connect(node).await
    }

    async fn send(&self, msg: Message) -> Result<usize> {
        self.inner().send(msg).await
    }

    async fn receive(&self) -> Result<Message> {
        self.inner().receive().await
    }

    fn local_node(&self) -> Node {
        self.inner().local_node()
    }

    fn set_local_node(&self, node: Node) {
        self.inner().set_local_node(node)
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_kind_from_str() {
        assert_eq!("reliable".parse::<BindingKind>().unwrap(), BindingKind::Reliable);
        assert_eq!("UDP".parse::<BindingKind>().unwrap(), BindingKind::Multicast);
        assert!("carrier-pigeon".parse::<BindingKind>().is_err());
    }
}
