//! State shared by both bindings: local identity, context, channel table.

use std::collections::HashMap;
use std::sync::Arc;

use corelib::{Node, NodeId};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::TransportConfig;
use crate::context::Context;
use crate::error::{Result, TransportError};

pub(crate) struct VanState<C> {
    pub(crate) config: TransportConfig,
    my_node: RwLock<Node>,
    context: RwLock<Option<Arc<Context>>>,
    /// Outbound channels by peer id. Holding the guard is the send lock.
    channels: Mutex<HashMap<NodeId, C>>,
}

impl<C> VanState<C> {
    pub(crate) fn new(my_node: Node, config: TransportConfig) -> Self {
        Self {
            config,
            my_node: RwLock::new(my_node),
            context: RwLock::new(None),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Create the context, unless one already exists.
    pub(crate) fn start(&self) -> Result<Arc<Context>> {
        let mut slot = self.context.write();
        if slot.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let ctx = Context::new(self.config.max_sockets)?;
        *slot = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    pub(crate) fn context(&self) -> Result<Arc<Context>> {
        self.context.read().clone().ok_or(TransportError::NotStarted)
    }

    /// Release the context. Later calls see [`TransportError::NotStarted`].
    pub(crate) fn take_context(&self) -> Option<Arc<Context>> {
        self.context.write().take()
    }

    pub(crate) fn local_node(&self) -> Node {
        self.my_node.read().clone()
    }

    pub(crate) fn set_local_node(&self, node: Node) {
        *self.my_node.write() = node;
    }

    pub(crate) fn set_port(&self, port: u16) {
        self.my_node.write().port = i32::from(port);
    }

    pub(crate) async fn channels(&self) -> MutexGuard<'_, HashMap<NodeId, C>> {
        self.channels.lock().await
    }

    pub(crate) async fn connected_peers(&self) -> Vec<NodeId> {
        let mut peers: Vec<NodeId> = self.channels.lock().await.keys().copied().collect();
        peers.sort();
        peers
    }
}

/// Port to bind for `node`. An unassigned port asks the OS for one.
pub(crate) fn bind_port(node: &Node) -> Result<u16> {
    if !node.has_port() {
        return Ok(0);
    }
    u16::try_from(node.port).map_err(|_| {
        TransportError::Core(corelib::Error::InvalidNode(format!(
            "{node}: port {} out of range",
            node.port
        )))
    })
}

/// Address parts of a connect target, rejecting nodes that cannot be
/// reached.
pub(crate) fn peer_addr(node: &Node) -> Result<(&str, u16)> {
    let invalid = |why: &str| {
        TransportError::Core(corelib::Error::InvalidNode(format!("{node}: {why}")))
    };
    if node.id.is_empty() {
        return Err(invalid("id is not assigned"));
    }
    if node.hostname.is_empty() {
        return Err(invalid("hostname is empty"));
    }
    match u16::try_from(node.port) {
        Ok(port) if port != 0 => Ok((node.hostname.as_str(), port)),
        _ => Err(invalid("port is not assigned")),
    }
}

/// Peers sharing our role are never connected to, except ourselves.
pub(crate) fn skip_same_role(me: &Node, peer: &Node) -> bool {
    if peer.role == me.role && peer.id != me.id {
        debug!(me = %me, peer = %peer, "skipping connect to same-role peer");
        return true;
    }
    false
}
