//! Multi-frame framing for stream connections.
//!
//! Layout of one frame on the stream:
//! ```text
//! [flags u8][len u32 LE][payload]
//! ```
//! Bit 0 of `flags` is MORE: another frame of the same message follows.
//! A message is a run of frames ending with one that has MORE clear.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FLAG_MORE: u8 = 0x01;
pub const FRAME_HEADER_LEN: usize = 5;

const READ_CHUNK: usize = 64 * 1024;

/// One frame of a multi-frame message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Bytes,
    pub more: bool,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, more: bool) -> Self {
        Self {
            data: data.into(),
            more,
        }
    }
}

/// Splits frames out of a read buffer without copying their payloads.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameDecoder {
    max_len: usize,
}

impl FrameDecoder {
    pub(crate) fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    /// Take one complete frame off the front of `buf`, if there is one.
    pub(crate) fn decode(&self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let flags = buf[0];
        if flags & !FLAG_MORE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown frame flags {flags:#04x}"),
            ));
        }
        let len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        if len > self.max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds limit of {}", self.max_len),
            ));
        }
        if buf.len() < FRAME_HEADER_LEN + len {
            // Grow with the payload that arrives, not the advertised length.
            let missing = FRAME_HEADER_LEN + len - buf.len();
            buf.reserve(missing.min(READ_CHUNK));
            return Ok(None);
        }
        buf.advance(FRAME_HEADER_LEN);
        Ok(Some(Frame {
            data: buf.split_to(len).freeze(),
            more: flags & FLAG_MORE != 0,
        }))
    }
}

/// Read the next frame. `Ok(None)` means the peer closed cleanly between
/// frames.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    decoder: &FrameDecoder,
) -> io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(frame) = decoder.decode(buf)? {
            return Ok(Some(frame));
        }
        if buf.capacity() - buf.len() < READ_CHUNK / 4 {
            buf.reserve(READ_CHUNK);
        }
        let n = match reader.read_buf(buf).await {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                ))
            };
        }
    }
}

/// Write one frame, returning the payload length.
///
/// The payload is written straight from `data`; it is dropped (and its
/// storage released, if this was the last reference) once the write ends.
pub(crate) async fn write_frame<W>(writer: &mut W, data: Bytes, more: bool) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let len = data.len();
    let wire_len = u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {len} bytes is too large"),
        )
    })?;
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0] = if more { FLAG_MORE } else { 0 };
    header[1..].copy_from_slice(&wire_len.to_le_bytes());

    let mut out = Buf::chain(&header[..], data);
    while out.has_remaining() {
        match writer.write_all_buf(&mut out).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(len)
}
