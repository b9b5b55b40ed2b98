//! Datagram receiver with group membership.

use std::collections::HashSet;
use std::io;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{trace, warn};

use super::datagram::DatagramSocket;
use super::{ipc_port, split_group, validate_group, MAX_GROUP_LEN};
use crate::context::{Shutdown, SocketPermit};
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Datagrams of the maximum size that fit in one receive allocation.
const DATAGRAMS_PER_BUFFER: usize = 4;

pub(crate) struct DishSocket {
    socket: DatagramSocket,
    port: u16,
    groups: Mutex<HashSet<String>>,
    max_len: usize,
    /// Receive buffer. Delivered datagrams are split off its front, so the
    /// unused tail is reused by the next receive.
    buf: AsyncMutex<BytesMut>,
    shutdown: Shutdown,
    _permit: Option<SocketPermit>,
}

impl DishSocket {
    pub(crate) fn new(
        socket: DatagramSocket,
        endpoint: &Endpoint,
        max_len: usize,
        shutdown: Shutdown,
    ) -> Self {
        let port = match (socket.local_port(), endpoint) {
            (Some(port), _) => port,
            (None, Endpoint::Ipc { path }) => ipc_port(path),
            (None, _) => 0,
        };
        Self {
            socket,
            port,
            groups: Mutex::new(HashSet::new()),
            max_len,
            buf: AsyncMutex::new(BytesMut::new()),
            shutdown,
            _permit: None,
        }
    }

    /// Charge this socket against the context's socket budget.
    pub(crate) fn with_permit(mut self, permit: SocketPermit) -> Self {
        self._permit = Some(permit);
        self
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Start accepting datagrams tagged with `group`.
    pub(crate) fn join(&self, group: &str) -> io::Result<()> {
        validate_group(group)?;
        if !self.groups.lock().insert(group.to_string()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("group {group:?} already joined"),
            ));
        }
        Ok(())
    }

    /// Wait for a datagram of a joined group and return its body (group tag
    /// removed). Anything else is dropped and the wait goes on.
    pub(crate) async fn recv(&self) -> Result<Bytes> {
        let mut shutdown = self.shutdown.clone();
        let mut buf = tokio::select! {
            guard = self.buf.lock() => guard,
            _ = shutdown.wait() => return Err(TransportError::Closed),
        };
        // One byte past the limit tells a full-size datagram from an
        // oversized one.
        let capacity = 1 + MAX_GROUP_LEN + self.max_len + 1;
        loop {
            buf.clear();
            if buf.capacity() < capacity {
                buf.reserve(capacity * DATAGRAMS_PER_BUFFER);
            }
            let n = tokio::select! {
                r = self.socket.recv(&mut *buf) => match r {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(TransportError::Recv(e)),
                },
                _ = shutdown.wait() => return Err(TransportError::Closed),
            };
            if n >= capacity {
                warn!(limit = self.max_len, "dropping oversized datagram");
                metrics::counter!(
                    "van_dropped_datagrams",
                    "binding" => "multicast",
                    "reason" => "oversized"
                )
                .increment(1);
                continue;
            }
            let mut datagram = buf.split_to(n).freeze();
            match split_group(&mut datagram) {
                Some(group) if self.is_joined(&group) => return Ok(datagram),
                group => {
                    trace!(?group, bytes = n, "dropping datagram for foreign group");
                    metrics::counter!(
                        "van_dropped_datagrams",
                        "binding" => "multicast",
                        "reason" => "group"
                    )
                    .increment(1);
                }
            }
        }
    }

    fn is_joined(&self, group: &[u8]) -> bool {
        std::str::from_utf8(group)
            .map(|g| self.groups.lock().contains(g))
            .unwrap_or(false)
    }
}
