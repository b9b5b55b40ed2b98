//! Zero-copy payload buffers.
//!
//! A [`Segment`] is one payload chunk of a message. It is backed by
//! [`bytes::Bytes`], so clones share memory and the backing storage is
//! released when the last holder drops it, whichever side that is.
//!
//! Two lifetimes show up around the transport:
//!
//! - plain buffers (packed meta, datagrams) owned by a single call and
//!   freed when it returns;
//! - payload segments, handed over by value on send and released by the
//!   network layer once written, or handed up on receive as slices of the
//!   buffer the socket read into.
//!
//! [`Segment::with_release`] attaches an action that runs exactly once when
//! the storage is finally released.

use std::fmt;
use std::ops::{Deref, RangeBounds};

use bytes::Bytes;

/// One payload chunk of a message.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Segment(Bytes);

impl Segment {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Segment(bytes.into())
    }

    /// Segment holding a copy of `data`.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Segment(Bytes::copy_from_slice(data))
    }

    /// Wrap `data` and run `release` once the last holder drops it.
    ///
    /// The release action runs on whichever thread drops the last clone; on
    /// the send path that is the network layer after the frame is written.
    pub fn with_release<T, F>(data: T, release: F) -> Self
    where
        T: AsRef<[u8]> + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        Segment(Bytes::from_owner(Released {
            data,
            release: Some(Box::new(release)),
        }))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Sub-range of this segment sharing the same memory.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        Segment(self.0.slice(range))
    }

    /// True if both segments point into overlapping memory.
    pub fn shares_memory_with(&self, other: &Segment) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let a = self.0.as_ptr() as usize;
        let b = other.0.as_ptr() as usize;
        a < b + other.len() && b < a + self.len()
    }
}

impl Deref for Segment {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Segment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Segment {
    fn from(bytes: Bytes) -> Self {
        Segment(bytes)
    }
}

impl From<Vec<u8>> for Segment {
    fn from(v: Vec<u8>) -> Self {
        Segment(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Segment {
    fn from(s: &'static [u8]) -> Self {
        Segment(Bytes::from_static(s))
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment(Bytes::from(s))
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Segment({} bytes)", self.len())
    }
}

struct Released<T> {
    data: T,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Released<T> {
    fn as_ref(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<T> Drop for Released<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
