//! Messages exchanged between nodes.

use crate::buffer::Segment;
use crate::error::{Error, Result};
use crate::meta::{DataType, Meta};

/// A message: metadata plus an ordered list of payload segments.
///
/// Transports take messages by value, so a sent message (and the payload
/// memory it owns) belongs to the network layer from then on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub meta: Meta,
    pub data: Vec<Segment>,
}

impl Message {
    pub fn new(meta: Meta) -> Self {
        Self {
            meta,
            data: Vec::new(),
        }
    }

    /// Append a payload segment together with its element type.
    pub fn add_data(&mut self, data_type: DataType, segment: impl Into<Segment>) {
        self.meta.data_type.push(data_type);
        self.data.push(segment.into());
    }

    /// Total payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.data.iter().map(Segment::len).sum()
    }

    /// Check that `meta.data_type` describes exactly the attached segments.
    pub fn check(&self) -> Result<()> {
        if self.meta.data_type.len() != self.data.len() {
            return Err(Error::InvalidMessage(format!(
                "{} data types for {} segments",
                self.meta.data_type.len(),
                self.data.len()
            )));
        }
        Ok(())
    }
}
