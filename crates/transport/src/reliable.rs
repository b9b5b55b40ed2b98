//! Reliable binding: multi-frame messages over router/dealer streams.
//!
//! One message on a channel:
//! ```text
//! frame0  identity   (greeting, once per connection; re-attached by the router)
//! frame1  meta       (MORE iff payload segments follow)
//! frame2.. segments  (MORE on all but the last)
//! ```

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use corelib::{
    decode_identity, encode_identity, pack_meta, unpack_meta, Message, Node, NodeId, Segment,
};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::endpoint::{Endpoint, Scheme};
use crate::error::{Result, TransportError};
use crate::retry::{bind_with_retry, PortCandidates};
use crate::socket::conn::Listener;
use crate::socket::dealer::DealerSocket;
use crate::socket::frame::FrameDecoder;
use crate::socket::router::{Multipart, RouterSocket};
use crate::state::{bind_port, peer_addr, skip_same_role, VanState};
use crate::transport::Transport;

const BINDING: &str = "reliable";

pub struct ReliableBinding {
    state: VanState<DealerSocket>,
    receiver: RwLock<Option<Arc<RouterSocket>>>,
}

impl ReliableBinding {
    pub fn new(my_node: Node, config: TransportConfig) -> Self {
        Self {
            state: VanState::new(my_node, config),
            receiver: RwLock::new(None),
        }
    }

    /// Ids with an open outbound channel, sorted.
    pub async fn connected_peers(&self) -> Vec<NodeId> {
        self.state.connected_peers().await
    }

    fn router(&self) -> Result<Arc<RouterSocket>> {
        self.state.context()?;
        self.receiver.read().clone().ok_or(TransportError::NotBound)
    }
}

#[async_trait]
impl Transport for ReliableBinding {
    async fn start(&self) -> Result<()> {
        self.state.start()?;
        debug!(node = %self.state.local_node(), "reliable transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let ctx = self.state.take_context().ok_or(TransportError::NotStarted)?;
        debug!("{} is stopping", self.state.local_node());
        ctx.shutdown();

        let router = self.receiver.write().take();
        if let Some(router) = router {
            router.close().await;
        }

        let mut channels = self.state.channels().await;
        for (id, dealer) in channels.drain() {
            if let Err(e) = dealer.set_linger_zero() {
                let endpoint = dealer.endpoint();
                debug!(node = %id, %endpoint, error = %e, "set linger failed");
            }
        }
        Ok(())
    }

    async fn bind(&self, node: &Node, max_retry: usize) -> Result<u16> {
        let ctx = self.state.context()?;
        let local = self.state.config.local;
        let permit = ctx.acquire_socket()?;

        let candidates = PortCandidates::new(bind_port(node)?);
        let ((listener, endpoint), _) =
            bind_with_retry(candidates, max_retry, |port| async move {
                let endpoint = Endpoint::bind(Scheme::Tcp, port, local);
                let listener = Listener::bind(&endpoint).await?;
                Ok((listener, endpoint))
            })
            .await?;

        let decoder = FrameDecoder::new(self.state.config.max_frame_len);
        let shutdown = ctx.shutdown_signal();
        let router = RouterSocket::new(listener, endpoint, decoder, shutdown, permit);
        let port = router.port();
        *self.receiver.write() = Some(Arc::new(router));
        self.state.set_port(port);
        debug!(node = %self.state.local_node(), "bound");
        Ok(port)
    }

    async fn connect(&self, node: &Node) -> Result<()> {
        let ctx = self.state.context()?;
        let (host, port) = peer_addr(node)?;
        let me = self.state.local_node();

        let mut channels = self.state.channels().await;
        if channels.remove(&node.id).is_some() {
            debug!(peer = %node, "closing previous channel");
        }
        if skip_same_role(&me, node) {
            return Ok(());
        }

        let endpoint = Endpoint::connect(Scheme::Tcp, host, port, self.state.config.local);
        let identity = if me.id.is_empty() {
            Bytes::new()
        } else {
            encode_identity(me.id)
        };
        let permit = ctx.acquire_socket()?;
        let dealer = DealerSocket::connect(endpoint.clone(), identity, permit)
            .await
            .map_err(|source| TransportError::Connect {
                addr: endpoint.to_string(),
                source,
            })?;
        debug!(peer = %node, %endpoint, "connected");
        channels.insert(node.id, dealer);
        Ok(())
    }

    async fn send(&self, msg: Message) -> Result<usize> {
        let ctx = self.state.context()?;
        let id = msg.meta.receiver;

        let mut channels = self.state.channels().await;
        let Some(dealer) = channels.get_mut(&id) else {
            warn!(node = %id, "there is no socket to node");
            return Err(TransportError::NoChannel(id));
        };
        msg.check()?;
        if dealer.is_broken() {
            channels.remove(&id);
            warn!(node = %id, "dropping channel after an unfinished send");
            return Err(TransportError::Send {
                node: id,
                source: io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "previous message was cut short, connect again",
                ),
            });
        }

        let mut shutdown = ctx.shutdown_signal();
        let written = tokio::select! {
            biased;
            _ = shutdown.wait() => return Err(TransportError::Closed),
            r = write_message(dealer, msg) => r,
        };
        let sent = match written {
            Ok(n) => n,
            Err(source) => {
                channels.remove(&id);
                warn!(node = %id, error = %source, "send failed, channel dropped");
                return Err(TransportError::Send { node: id, source });
            }
        };
        metrics::counter!("van_sent_bytes", "binding" => BINDING).increment(sent as u64);
        Ok(sent)
    }

    async fn receive(&self) -> Result<Message> {
        let router = self.router()?;
        let Multipart { frames } = router.recv().await?;

        let mut frames = frames.into_iter();
        let identity = frames
            .next()
            .ok_or_else(|| TransportError::Protocol("message without identity".into()))?;
        let meta = frames
            .next()
            .ok_or_else(|| TransportError::Protocol("message without meta frame".into()))?;

        let mut msg = Message::new(unpack_meta(&meta.data)?);
        msg.meta.sender = decode_identity(&identity.data);
        msg.meta.receiver = self.state.local_node().id;
        let mut recv_bytes = identity.data.len() + meta.data.len();
        if meta.more {
            msg.data = frames
                .map(|frame| {
                    recv_bytes += frame.data.len();
                    Segment::new(frame.data)
                })
                .collect();
        }
        trace!(
            sender = %msg.meta.sender,
            segments = msg.data.len(),
            bytes = recv_bytes,
            "message received"
        );
        metrics::counter!("van_recv_bytes", "binding" => BINDING).increment(recv_bytes as u64);
        Ok(msg)
    }

    fn local_node(&self) -> Node {
        self.state.local_node()
    }

    fn set_local_node(&self, node: Node) {
        self.state.set_local_node(node)
    }

    fn name(&self) -> &'static str {
        BINDING
    }
}

/// Write meta and payload frames. Segments are released as they are
/// written.
async fn write_message(dealer: &mut DealerSocket, msg: Message) -> io::Result<usize> {
    let Message { meta, data } = msg;
    let mut sent = dealer.send_frame(pack_meta(&meta), !data.is_empty()).await?;
    let last = data.len().saturating_sub(1);
    for (i, segment) in data.into_iter().enumerate() {
        sent += dealer.send_frame(segment.into_bytes(), i < last).await?;
    }
    Ok(sent)
}
