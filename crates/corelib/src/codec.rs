//! Binary codec for [`Meta`].
//!
//! A direct, versionless field-by-field transform. All integers are
//! little-endian and fixed width; strings and lists are prefixed with a
//! `u32` length.
//!
//! ```text
//! head        i32
//! body        u8 present, [u32 len, utf-8]
//! control     u8 present, [u8 cmd, (i32 group | u64 sig)?,
//!                          u32 nodes, nodes * (i32 id, u8 role, i32 port,
//!                                              u8 is_recovery, u32 len, host)]
//! sender      i32
//! receiver    i32
//! customer_id i32
//! timestamp   i64
//! request     u8
//! push        u8
//! simple_app  u8
//! data_type   u32 count, count * u8
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::meta::{Command, Control, DataType, Meta};
use crate::node::{Node, NodeId, Role};

/// Exact number of bytes [`pack_meta`] produces for `meta`.
pub fn packed_len(meta: &Meta) -> usize {
    let mut len = 4 + 1;
    if let Some(body) = &meta.body {
        len += 4 + body.len();
    }
    len += 1;
    if !meta.control.is_empty() {
        len += 1;
        len += match meta.control.cmd {
            Command::Barrier { .. } => 4,
            Command::Ack { .. } => 8,
            _ => 0,
        };
        len += 4;
        for node in &meta.control.nodes {
            len += 4 + 1 + 4 + 1 + 4 + node.hostname.len();
        }
    }
    len += 4 + 4 + 4 + 8 + 1 + 1 + 1;
    len + 4 + meta.data_type.len()
}

/// Serialise `meta` into a fresh buffer.
pub fn pack_meta(meta: &Meta) -> Bytes {
    let mut buf = BytesMut::with_capacity(packed_len(meta));
    pack_meta_into(meta, &mut buf);
    buf.freeze()
}

/// Serialise `meta` onto the end of `buf`.
pub fn pack_meta_into<B: BufMut>(meta: &Meta, buf: &mut B) {
    buf.put_i32_le(meta.head);

    match &meta.body {
        Some(body) => {
            buf.put_u8(1);
            put_str(buf, body);
        }
        None => buf.put_u8(0),
    }

    if meta.control.is_empty() {
        buf.put_u8(0);
    } else {
        buf.put_u8(1);
        pack_control(&meta.control, buf);
    }

    buf.put_i32_le(meta.sender.0);
    buf.put_i32_le(meta.receiver.0);
    buf.put_i32_le(meta.customer_id);
    buf.put_i64_le(meta.timestamp);
    buf.put_u8(meta.request as u8);
    buf.put_u8(meta.push as u8);
    buf.put_u8(meta.simple_app as u8);

    buf.put_u32_le(meta.data_type.len() as u32);
    for dt in &meta.data_type {
        buf.put_u8(*dt as u8);
    }
}

fn pack_control<B: BufMut>(control: &Control, buf: &mut B) {
    buf.put_u8(control.cmd.tag());
    match control.cmd {
        Command::Barrier { group } => buf.put_i32_le(group),
        Command::Ack { sig } => buf.put_u64_le(sig),
        _ => {}
    }
    buf.put_u32_le(control.nodes.len() as u32);
    for node in &control.nodes {
        buf.put_i32_le(node.id.0);
        buf.put_u8(node.role as u8);
        buf.put_i32_le(node.port);
        buf.put_u8(node.is_recovery as u8);
        put_str(buf, &node.hostname);
    }
}

fn put_str<B: BufMut>(buf: &mut B, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Decode a buffer produced by [`pack_meta`].
///
/// The whole buffer must be consumed; leftovers are an error.
pub fn unpack_meta(buf: &[u8]) -> Result<Meta, CodecError> {
    let mut r = Reader::new(buf);
    let meta = read_meta(&mut r)?;
    if r.remaining() != 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }
    Ok(meta)
}

fn read_meta(r: &mut Reader<'_>) -> Result<Meta, CodecError> {
    let head = r.i32("head")?;

    let body = if r.flag("body flag")? {
        Some(r.string("body")?)
    } else {
        None
    };

    let control = if r.flag("control flag")? {
        read_control(r)?
    } else {
        Control::default()
    };

    let sender = NodeId(r.i32("sender")?);
    let receiver = NodeId(r.i32("receiver")?);
    let customer_id = r.i32("customer_id")?;
    let timestamp = r.i64("timestamp")?;
    let request = r.flag("request")?;
    let push = r.flag("push")?;
    let simple_app = r.flag("simple_app")?;

    let count = r.u32("data_type count")? as usize;
    let tags = r.take(count, "data_type")?;
    let data_type = tags
        .iter()
        .map(|&tag| {
            DataType::from_u8(tag).ok_or(CodecError::InvalidTag {
                field: "data_type",
                tag,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Meta {
        head,
        body,
        control,
        sender,
        receiver,
        customer_id,
        timestamp,
        request,
        push,
        simple_app,
        data_type,
    })
}

fn read_control(r: &mut Reader<'_>) -> Result<Control, CodecError> {
    let tag = r.u8("cmd")?;
    let cmd = match tag {
        1 => Command::Terminate,
        2 => Command::AddNode,
        3 => Command::Barrier {
            group: r.i32("barrier_group")?,
        },
        4 => Command::Ack {
            sig: r.u64("msg_sig")?,
        },
        5 => Command::Heartbeat,
        _ => return Err(CodecError::InvalidTag { field: "cmd", tag }),
    };

    let count = r.u32("node count")? as usize;
    // Each node needs at least 14 bytes; don't trust the count blindly.
    let mut nodes = Vec::with_capacity(count.min(r.remaining() / 14));
    for _ in 0..count {
        let id = NodeId(r.i32("node id")?);
        let role_tag = r.u8("node role")?;
        let role = Role::from_u8(role_tag).ok_or(CodecError::InvalidTag {
            field: "role",
            tag: role_tag,
        })?;
        let port = r.i32("node port")?;
        let is_recovery = r.flag("node is_recovery")?;
        let hostname = r.string("hostname")?;
        nodes.push(Node {
            id,
            role,
            hostname,
            port,
            is_recovery,
        });
    }
    Ok(Control { cmd, nodes })
}

/// Bounds-checked little-endian reader over a borrowed buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        if self.buf.len() < n {
            return Err(CodecError::Truncated {
                field,
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(1, field)?[0])
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(CodecError::InvalidTag { field, tag }),
        }
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        self.array(field).map(u32::from_le_bytes)
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, CodecError> {
        self.array(field).map(i32::from_le_bytes)
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        self.array(field).map(u64::from_le_bytes)
    }

    fn i64(&mut self, field: &'static str) -> Result<i64, CodecError> {
        self.array(field).map(i64::from_le_bytes)
    }

    fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.u32(field)? as usize;
        let raw = self.take(len, field)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Meta {
        Meta {
            head: 3,
            body: Some("pull".to_string()),
            control: Control::with_nodes(
                Command::AddNode,
                vec![Node::new(Role::Server, "10.0.0.1", 8000).with_id(NodeId(8))],
            ),
            sender: NodeId(9),
            receiver: NodeId(1),
            customer_id: 0,
            timestamp: 42,
            request: true,
            push: false,
            simple_app: false,
            data_type: vec![DataType::UInt64, DataType::Float],
        }
    }

    #[test]
    fn test_packed_len_is_exact() {
        let meta = sample();
        assert_eq!(pack_meta(&meta).len(), packed_len(&meta));
        let empty = Meta::default();
        assert_eq!(pack_meta(&empty).len(), packed_len(&empty));
    }

    #[test]
    fn test_every_truncation_is_rejected() {
        let packed = pack_meta(&sample());
        for cut in 0..packed.len() {
            assert!(
                matches!(unpack_meta(&packed[..cut]), Err(CodecError::Truncated { .. })),
                "cut at {cut} was accepted"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut packed = pack_meta(&sample()).to_vec();
        packed.push(0);
        assert_eq!(unpack_meta(&packed), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_unknown_cmd_tag_rejected() {
        let mut meta = Meta::default();
        meta.control = Control::new(Command::Terminate);
        let mut packed = pack_meta(&meta).to_vec();
        // head(4) + body flag(1) + control flag(1), then the cmd tag
        packed[6] = 99;
        assert_eq!(
            unpack_meta(&packed),
            Err(CodecError::InvalidTag { field: "cmd", tag: 99 })
        );
    }
}
