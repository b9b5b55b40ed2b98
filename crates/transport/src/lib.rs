//! Pluggable network transport ("van") for cluster nodes.
//!
//! This crate provides:
//! - The [`Transport`] contract: start, bind, connect, send, receive, stop
//! - A reliable binding sending multi-frame messages over streams
//! - A multicast binding sending one group-tagged datagram per message
//! - The socket layer both bindings are built on
//!
//! Pick a binding with [`Van::new`]:
//!
//! ```no_run
//! use corelib::{Node, Role};
//! use transport::{BindingKind, Transport, TransportConfig, Van};
//!
//! # async fn demo() -> transport::Result<()> {
//! let me = Node::new(Role::Worker, "127.0.0.1", 0);
//! let van = Van::new(BindingKind::Reliable, me, TransportConfig::from_env()?);
//! van.start().await?;
//! let port = van.bind(&van.local_node(), 40).await?;
//! # let _ = port;
//! van.stop().await
//! # }
//! ```

pub mod config;
mod context;
pub mod endpoint;
pub mod error;
pub mod multicast;
pub mod reliable;
pub mod retry;
pub mod socket;
mod state;
pub mod transport;

pub use config::TransportConfig;
pub use endpoint::{Endpoint, Scheme};
pub use error::{Result, TransportError};
pub use multicast::MulticastBinding;
pub use reliable::ReliableBinding;
pub use transport::{BindingKind, Transport, Van};
