//! Receiving socket for reliable channels.
//!
//! The router accepts any number of peers. Each peer opens with one
//! greeting frame carrying its identity token; afterwards every complete
//! multi-frame message from that peer is delivered through a single inbox,
//! prefixed with the identity frame. Messages from different peers are
//! never interleaved because each is handed over only once complete.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, trace, warn};

use super::conn::{Conn, Listener};
use super::frame::{read_frame, Frame, FrameDecoder};
use super::ipc_port;
use crate::context::{Shutdown, SocketPermit};
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Messages buffered per router before peers are back-pressured.
const INBOX_CAPACITY: usize = 1000;

/// A complete message as delivered by the router: identity frame first.
#[derive(Debug)]
pub(crate) struct Multipart {
    pub(crate) frames: Vec<Frame>,
}

pub(crate) struct RouterSocket {
    endpoint: Endpoint,
    port: u16,
    inbox: AsyncMutex<mpsc::Receiver<Multipart>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Shutdown,
    _permit: SocketPermit,
}

impl RouterSocket {
    /// Start accepting peers on a bound `listener`.
    pub(crate) fn new(
        listener: Listener,
        endpoint: Endpoint,
        decoder: FrameDecoder,
        shutdown: Shutdown,
        permit: SocketPermit,
    ) -> Self {
        let port = match (&endpoint, listener.local_port()) {
            (_, Some(port)) => port,
            (Endpoint::Tcp { port, .. } | Endpoint::Udp { port, .. }, None) => *port,
            (Endpoint::Ipc { path }, None) => ipc_port(path),
        };
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let accept_task = tokio::spawn(accept_loop(listener, tx, decoder, shutdown.clone()));
        debug!(%endpoint, port, "router bound");
        Self {
            endpoint,
            port,
            inbox: AsyncMutex::new(rx),
            accept_task: Mutex::new(Some(accept_task)),
            shutdown,
            _permit: permit,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the next complete message from any peer.
    pub(crate) async fn recv(&self) -> Result<Multipart> {
        let mut shutdown = self.shutdown.clone();
        let mut inbox = tokio::select! {
            guard = self.inbox.lock() => guard,
            _ = shutdown.wait() => return Err(TransportError::Closed),
        };
        tokio::select! {
            msg = inbox.recv() => msg.ok_or(TransportError::Closed),
            _ = shutdown.wait() => Err(TransportError::Closed),
        }
    }

    /// Wait for the accept loop and peer readers to finish. Call after the
    /// context has been shut down.
    pub(crate) async fn close(&self) {
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "router accept task failed");
                }
            }
        }
        debug!(endpoint = %self.endpoint, "router closed");
    }
}

impl Drop for RouterSocket {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.get_mut().take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: Listener,
    inbox: mpsc::Sender<Multipart>,
    decoder: FrameDecoder,
    mut shutdown: Shutdown,
) {
    let mut peers = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => {
                    peers.spawn(serve_peer(conn, inbox.clone(), decoder, shutdown.clone()));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
            Some(_) = peers.join_next(), if !peers.is_empty() => {}
        }
    }
    drop(inbox);
    while peers.join_next().await.is_some() {}
}

async fn serve_peer(
    mut conn: Conn,
    inbox: mpsc::Sender<Multipart>,
    decoder: FrameDecoder,
    mut shutdown: Shutdown,
) {
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let result = tokio::select! {
        r = read_peer(&mut conn, &mut buf, &decoder, &inbox) => r,
        _ = shutdown.wait() => {
            if let Err(e) = conn.set_linger_zero() {
                debug!(error = %e, "set linger failed");
            }
            return;
        }
    };
    match result {
        Ok(()) => debug!("peer disconnected"),
        Err(e) => warn!(error = %e, "dropping peer connection"),
    }
}

async fn read_peer(
    conn: &mut Conn,
    buf: &mut BytesMut,
    decoder: &FrameDecoder,
    inbox: &mpsc::Sender<Multipart>,
) -> io::Result<()> {
    let identity = match read_frame(conn, buf, decoder).await? {
        Some(frame) if !frame.more => frame.data,
        Some(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "greeting must be a single frame",
            ))
        }
        None => return Ok(()),
    };
    trace!(identity = ?identity, "peer greeted");

    loop {
        let mut frames = vec![Frame::new(identity.clone(), true)];
        loop {
            match read_frame(conn, buf, decoder).await? {
                Some(frame) => {
                    let more = frame.more;
                    frames.push(frame);
                    if !more {
                        break;
                    }
                }
                None if frames.len() == 1 => return Ok(()),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-message",
                    ))
                }
            }
        }
        trace!(frames = frames.len(), "message complete");
        if inbox.send(Multipart { frames }).await.is_err() {
            return Ok(());
        }
    }
}
