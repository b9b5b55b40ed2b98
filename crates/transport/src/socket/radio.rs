//! Datagram sender for multicast channels.

use std::io;

use bytes::BytesMut;

use super::datagram::DatagramSocket;
use super::{put_group, validate_group};
use crate::context::SocketPermit;
use crate::endpoint::Endpoint;
use crate::retry::retry_interrupted;

pub(crate) struct RadioSocket {
    socket: DatagramSocket,
    endpoint: Endpoint,
    group: String,
    /// Transmission rate hint in kbit/s.
    rate: Option<u32>,
    _permit: SocketPermit,
}

impl RadioSocket {
    pub(crate) async fn connect(
        endpoint: Endpoint,
        group: &str,
        permit: SocketPermit,
    ) -> io::Result<Self> {
        validate_group(group)?;
        let socket = DatagramSocket::connect(&endpoint).await?;
        Ok(Self {
            socket,
            endpoint,
            group: group.to_string(),
            rate: None,
            _permit: permit,
        })
    }

    pub(crate) fn set_rate(&mut self, kbps: u32) {
        self.rate = Some(kbps);
    }

    pub(crate) fn rate(&self) -> Option<u32> {
        self.rate
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Start a datagram with room for `body_len` more bytes after the
    /// group tag.
    pub(crate) fn datagram(&self, body_len: usize) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1 + self.group.len() + body_len);
        put_group(&mut buf, &self.group);
        buf
    }

    /// Send one datagram started by [`RadioSocket::datagram`] in a single
    /// call.
    pub(crate) async fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        let socket = &self.socket;
        retry_interrupted(move || socket.send(datagram)).await
    }
}
