//! Core library for the cluster transport.
//!
//! This crate provides the transport-independent pieces:
//! - Node identity and roles
//! - Message metadata and messages
//! - The binary meta codec and identity tokens
//! - Zero-copy payload segments

pub mod buffer;
pub mod codec;
pub mod error;
pub mod identity;
pub mod message;
pub mod meta;
pub mod node;

pub use buffer::Segment;
pub use codec::{pack_meta, unpack_meta};
pub use error::{CodecError, Error, Result};
pub use identity::{decode_identity, encode_identity};
pub use message::Message;
pub use meta::{Command, Control, DataType, Meta};
pub use node::{Node, NodeId, Role};
