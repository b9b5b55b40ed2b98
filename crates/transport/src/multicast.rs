//! Multicast binding: every message is one group-tagged datagram.
//!
//! Datagram body after the group tag, little-endian:
//! ```text
//! [sender i32][meta_len u32][meta][count u32] then count x [len u32][bytes]
//! ```
//! No delivery, ordering or retransmission guarantees.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use corelib::codec::{pack_meta_into, packed_len};
use corelib::{unpack_meta, CodecError, Message, Meta, Node, NodeId, Segment};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::endpoint::{Endpoint, Scheme};
use crate::error::{Result, TransportError};
use crate::retry::{bind_with_retry, PortCandidates};
use crate::socket::datagram::DatagramSocket;
use crate::socket::dish::DishSocket;
use crate::socket::radio::RadioSocket;
use crate::state::{bind_port, peer_addr, skip_same_role, VanState};
use crate::transport::Transport;

const BINDING: &str = "multicast";

pub struct MulticastBinding {
    state: VanState<RadioSocket>,
    receiver: RwLock<Option<Arc<DishSocket>>>,
}

impl MulticastBinding {
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

    /// Rate hint recorded on the channel to `id`, in kbit/s.
    pub async fn channel_rate(&self, id: NodeId) -> Option<u32> {
        self.state.channels().await.get(&id).and_then(RadioSocket::rate)
    }

    fn dish(&self) -> Result<Arc<DishSocket>> {
        self.state.context()?;
        self.receiver.read().clone().ok_or(TransportError::NotBound)
    }
}

#[async_trait]
impl Transport for MulticastBinding {
    async fn start(&self) -> Result<()> {
        self.state.start()?;
        debug!(node = %self.state.local_node(), "multicast transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let ctx = self.state.take_context().ok_or(TransportError::NotStarted)?;
        debug!("{} is stopping", self.state.local_node());
        ctx.shutdown();
        self.receiver.write().take();
        for (id, radio) in self.state.channels().await.drain() {
            trace!(node = %id, endpoint = %radio.endpoint(), "closing channel");
        }
        Ok(())
    }

    async fn bind(&self, node: &Node, max_retry: usize) -> Result<u16> {
        let ctx = self.state.context()?;
        let config = &self.state.config;
        let permit = ctx.acquire_socket()?;
        let shutdown = ctx.shutdown_signal();

        // An attempt counts only if both the address claim and the group
        // join succeed.
        let candidates = PortCandidates::new(bind_port(node)?);
        let ((dish, endpoint), _) = bind_with_retry(candidates, max_retry, |port| {
            let endpoint = Endpoint::bind(Scheme::Udp, port, config.local);
            let shutdown = shutdown.clone();
            async move {
                let socket = DatagramSocket::bind(&endpoint).await?;
                let dish = DishSocket::new(socket, &endpoint, config.max_datagram_len, shutdown);
                dish.join(&config.group)?;
                Ok((dish, endpoint))
            }
        })
        .await?;

        let dish = dish.with_permit(permit);
        let port = dish.port();
        *self.receiver.write() = Some(Arc::new(dish));
        self.state.set_port(port);
        debug!(node = %self.state.local_node(), %endpoint, group = %config.group, "bound");
        Ok(port)
    }

    async fn connect(&self, node: &Node) -> Result<()> {
        let ctx = self.state.context()?;
        let (host, port) = peer_addr(node)?;
        let me = self.state.local_node();
        let config = &self.state.config;

        let mut channels = self.state.channels().await;
        if channels.remove(&node.id).is_some() {
            debug!(peer = %node, "closing previous channel");
        }
        if skip_same_role(&me, node) {
            return Ok(());
        }

        let endpoint = Endpoint::connect(Scheme::Udp, host, port, config.local);
        let permit = ctx.acquire_socket()?;
        let mut radio = RadioSocket::connect(endpoint.clone(), &config.group, permit)
            .await
            .map_err(|source| TransportError::Connect {
                addr: endpoint.to_string(),
                source,
            })?;
        if !me.id.is_empty() {
            radio.set_rate(config.multicast_rate);
        }
        debug!(peer = %node, %endpoint, "connected");
        channels.insert(node.id, radio);
        Ok(())
    }

    async fn send(&self, msg: Message) -> Result<usize> {
        let ctx = self.state.context()?;
        let id = msg.meta.receiver;
        let sender = self.state.local_node().id;

        let channels = self.state.channels().await;
        let Some(radio) = channels.get(&id) else {
            warn!(node = %id, "there is no socket to node");
            return Err(TransportError::NoChannel(id));
        };
        msg.check()?;

        let body_len = datagram_len(&msg.meta, &msg.data);
        let limit = self.state.config.max_datagram_len;
        if 1 + self.state.config.group.len() + body_len > limit {
            return Err(TransportError::Send {
                node: id,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("message of {body_len} bytes exceeds datagram limit of {limit}"),
                ),
            });
        }
        let mut datagram = radio.datagram(body_len);
        encode_datagram(&mut datagram, sender, &msg.meta, &msg.data);

        let mut shutdown = ctx.shutdown_signal();
        let sent = tokio::select! {
            biased;
            _ = shutdown.wait() => return Err(TransportError::Closed),
            r = radio.send(&datagram) => r,
        };
        let sent = match sent {
            Ok(n) if n == datagram.len() => n,
            Ok(n) => {
                let source = io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("sent {n} of {} datagram bytes", datagram.len()),
                );
                return Err(TransportError::Send { node: id, source });
            }
            Err(source) => {
                warn!(node = %id, error = %source, "send failed");
                return Err(TransportError::Send { node: id, source });
            }
        };
        metrics::counter!("van_sent_bytes", "binding" => BINDING).increment(sent as u64);
        Ok(sent)
    }

    async fn receive(&self) -> Result<Message> {
        let dish = self.dish()?;
        let datagram = dish.recv().await?;
        let recv_bytes = datagram.len();

        let (sender, meta, data) = decode_datagram(datagram)?;
        let mut msg = Message { meta, data };
        msg.meta.sender = sender;
        msg.meta.receiver = self.state.local_node().id;
        trace!(
            sender = %sender,
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

/// Body size of the datagram carrying `meta` and `data`, group tag excluded.
pub(crate) fn datagram_len(meta: &Meta, data: &[Segment]) -> usize {
    4 + 4 + packed_len(meta) + 4 + data.iter().map(|s| 4 + s.len()).sum::<usize>()
}

pub(crate) fn encode_datagram<B: BufMut>(
    buf: &mut B,
    sender: NodeId,
    meta: &Meta,
    data: &[Segment],
) {
    buf.put_i32_le(sender.0);
    buf.put_u32_le(packed_len(meta) as u32);
    pack_meta_into(meta, buf);
    buf.put_u32_le(data.len() as u32);
    for segment in data {
        buf.put_u32_le(segment.len() as u32);
        buf.put_slice(segment);
    }
}

/// Split a datagram body into sender, meta and payload segments. Segments
/// are slices of `datagram`.
pub(crate) fn decode_datagram(mut datagram: Bytes) -> Result<(NodeId, Meta, Vec<Segment>)> {
    let sender = NodeId(take_u32(&mut datagram, "sender")? as i32);
    let meta_len = take_u32(&mut datagram, "meta length")? as usize;
    let meta = unpack_meta(&take(&mut datagram, meta_len, "meta")?)?;

    let count = take_u32(&mut datagram, "segment count")? as usize;
    // Every segment costs at least its length prefix.
    if count > datagram.len() / 4 {
        return Err(CodecError::Truncated {
            field: "segments",
            needed: count * 4,
            remaining: datagram.len(),
        }
        .into());
    }
    let mut data = Vec::with_capacity(count);
    for _ in 0..count {
        let len = take_u32(&mut datagram, "segment length")? as usize;
        data.push(Segment::new(take(&mut datagram, len, "segment")?));
    }
    if !datagram.is_empty() {
        return Err(CodecError::TrailingBytes(datagram.len()).into());
    }
    Ok((sender, meta, data))
}

fn take(
    buf: &mut Bytes,
    len: usize,
    field: &'static str,
) -> std::result::Result<Bytes, CodecError> {
    if buf.len() < len {
        return Err(CodecError::Truncated {
            field,
            needed: len,
            remaining: buf.len(),
        });
    }
    Ok(buf.split_to(len))
}

fn take_u32(buf: &mut Bytes, field: &'static str) -> std::result::Result<u32, CodecError> {
    Ok(take(buf, 4, field)?.get_u32_le())
}
