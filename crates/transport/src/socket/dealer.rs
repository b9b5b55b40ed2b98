//! Outbound socket for reliable channels.

use std::io;

use bytes::Bytes;
use tracing::trace;

use super::conn::Conn;
use super::frame::write_frame;
use crate::context::SocketPermit;
use crate::endpoint::Endpoint;

/// One outbound stream to a peer's router.
pub(crate) struct DealerSocket {
    conn: Conn,
    endpoint: Endpoint,
    /// Set while a message is on its way out. Still set between calls means
    /// a write was cancelled or failed, leaving a partial frame or message
    /// on the stream.
    mid_message: bool,
    _permit: SocketPermit,
}

impl DealerSocket {
    /// Connect and announce `identity`. An empty identity tells the router
    /// that the sender is not known yet.
    pub(crate) async fn connect(
        endpoint: Endpoint,
        identity: Bytes,
        permit: SocketPermit,
    ) -> io::Result<Self> {
        let mut conn = Conn::connect(&endpoint).await?;
        write_frame(&mut conn, identity, false).await?;
        Ok(Self {
            conn,
            endpoint,
            mid_message: false,
            _permit: permit,
        })
    }

    pub(crate) async fn send_frame(&mut self, data: Bytes, more: bool) -> io::Result<usize> {
        self.mid_message = true;
        let n = write_frame(&mut self.conn, data, more).await?;
        self.mid_message = more;
        trace!(endpoint = %self.endpoint, bytes = n, more, "frame sent");
        Ok(n)
    }

    /// True once a message was cut short. The peer can no longer find frame
    /// boundaries on this stream, so it must not carry anything else.
    pub(crate) fn is_broken(&self) -> bool {
        self.mid_message
    }

    pub(crate) fn set_linger_zero(&self) -> io::Result<()> {
        self.conn.set_linger_zero()
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}
