//! Datagram sockets over UDP or Unix datagram sockets.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use bytes::BytesMut;
use tokio::net::{lookup_host, UdpSocket, UnixDatagram};

use crate::endpoint::Endpoint;

pub(crate) enum DatagramSocket {
    Udp(UdpSocket),
    Unix {
        socket: UnixDatagram,
        /// Socket file to remove on drop, for bound sockets.
        path: Option<PathBuf>,
    },
}

impl DatagramSocket {
    pub(crate) async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Udp { .. } => {
                let (host, port) = endpoint
                    .socket_addr()
                    .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
                Ok(DatagramSocket::Udp(UdpSocket::bind((host.as_str(), port)).await?))
            }
            Endpoint::Ipc { path } => Ok(DatagramSocket::Unix {
                socket: UnixDatagram::bind(path)?,
                path: Some(path.clone()),
            }),
            Endpoint::Tcp { .. } => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{endpoint} is not a datagram endpoint"),
            )),
        }
    }

    pub(crate) async fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Udp { host, port } => {
                let peer = lookup_host((host.as_str(), *port)).await?.next().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{host} did not resolve to an address"),
                    )
                })?;
                let local: SocketAddr = match peer {
                    SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
                    SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
                };
                let socket = UdpSocket::bind(local).await?;
                socket.connect(peer).await?;
                Ok(DatagramSocket::Udp(socket))
            }
            Endpoint::Ipc { path } => {
                let socket = UnixDatagram::unbound()?;
                socket.connect(path)?;
                Ok(DatagramSocket::Unix { socket, path: None })
            }
            Endpoint::Tcp { .. } => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{endpoint} is not a datagram endpoint"),
            )),
        }
    }

    pub(crate) fn local_port(&self) -> Option<u16> {
        match self {
            DatagramSocket::Udp(s) => s.local_addr().ok().map(|a| a.port()),
            DatagramSocket::Unix { .. } => None,
        }
    }

    pub(crate) async fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        match self {
            DatagramSocket::Udp(s) => s.send(datagram).await,
            DatagramSocket::Unix { socket, .. } => socket.send(datagram).await,
        }
    }

    /// Receive one datagram into the spare capacity of `buf`. Bytes beyond
    /// that capacity are discarded.
    pub(crate) async fn recv(&self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            DatagramSocket::Udp(s) => s.recv_buf_from(buf).await.map(|(n, _)| n),
            DatagramSocket::Unix { socket, .. } => {
                socket.recv_buf_from(buf).await.map(|(n, _)| n)
            }
        }
    }
}

impl Drop for DatagramSocket {
    fn drop(&mut self) {
        if let DatagramSocket::Unix { path: Some(path), .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}
