//! Identity tokens carried by reliable channels.
//!
//! An outbound channel announces its owner as `"ps" + decimal(id)`; the
//! receiving side turns the token back into a [`NodeId`].

use bytes::Bytes;

use crate::node::NodeId;

const PREFIX: &[u8; 2] = b"ps";

/// Encode `id` as an identity token.
pub fn encode_identity(id: NodeId) -> Bytes {
    Bytes::from(format!("ps{}", id.0))
}

/// Resolve an identity token to a node id.
///
/// Returns [`NodeId::EMPTY`] ("sender unknown") unless the buffer is the
/// prefix followed by at least one ASCII digit and nothing else.
pub fn decode_identity(buf: &[u8]) -> NodeId {
    if buf.len() <= PREFIX.len() || &buf[..PREFIX.len()] != PREFIX {
        return NodeId::EMPTY;
    }
    let mut id: i32 = 0;
    for &b in &buf[PREFIX.len()..] {
        if !b.is_ascii_digit() {
            return NodeId::EMPTY;
        }
        id = match id
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i32))
        {
            Some(v) => v,
            None => return NodeId::EMPTY,
        };
    }
    NodeId(id)
}
