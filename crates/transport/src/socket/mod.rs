//! Socket layer under the bindings.
//!
//! Four socket kinds, two per binding:
//! - router (reliable): listens, delivers whole messages tagged with the
//!   peer identity
//! - dealer (reliable): outbound stream that greets with an identity token
//! - dish (multicast): datagram receiver filtering by joined group
//! - radio (multicast): datagram sender tagging every datagram with a group

pub(crate) mod conn;
pub(crate) mod datagram;
pub(crate) mod dealer;
pub(crate) mod dish;
pub mod frame;
pub(crate) mod radio;
pub(crate) mod router;

use std::io;
use std::path::Path;

use bytes::{Buf, BufMut, Bytes};

pub use frame::Frame;

/// Longest group name a datagram can be tagged with.
pub const MAX_GROUP_LEN: usize = 15;

pub(crate) fn validate_group(group: &str) -> io::Result<()> {
    if group.is_empty() || group.len() > MAX_GROUP_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("group name must be 1..={MAX_GROUP_LEN} bytes, got {}", group.len()),
        ));
    }
    Ok(())
}

/// Port a local-mode socket file stands for (`/tmp/<port>`).
pub(crate) fn ipc_port(path: &Path) -> u16 {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse().ok())
        .unwrap_or(0)
}

/// Write the group tag that prefixes every datagram.
pub(crate) fn put_group<B: BufMut>(buf: &mut B, group: &str) {
    buf.put_u8(group.len() as u8);
    buf.put_slice(group.as_bytes());
}

/// Strip the group tag off `datagram`, returning the group.
pub(crate) fn split_group(datagram: &mut Bytes) -> Option<Bytes> {
    let len = *datagram.first()? as usize;
    if len == 0 || len > MAX_GROUP_LEN || datagram.len() < 1 + len {
        return None;
    }
    datagram.advance(1);
    Some(datagram.split_to(len))
}
