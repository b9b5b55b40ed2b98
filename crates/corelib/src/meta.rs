//! Message metadata.
//!
//! `Meta` is everything a message carries besides its payload: routing ids,
//! application tags and, on control-plane messages, a [`Control`] block.

use crate::node::{Node, NodeId};

/// Control-plane command.
///
/// Fields that only make sense for one command are carried by that variant,
/// so a barrier never has a stray message signature and vice versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Command {
    /// Data-plane message; no control block on the wire.
    #[default]
    Empty,
    Terminate,
    AddNode,
    Barrier { group: i32 },
    Ack { sig: u64 },
    Heartbeat,
}

impl Command {
    /// Wire tag. `Empty` is encoded by omission and has no tag of its own.
    pub fn tag(self) -> u8 {
        match self {
            Command::Empty => 0,
            Command::Terminate => 1,
            Command::AddNode => 2,
            Command::Barrier { .. } => 3,
            Command::Ack { .. } => 4,
            Command::Heartbeat => 5,
        }
    }
}

/// Control block of a message.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Control {
    pub cmd: Command,
    /// Membership carried by `AddNode`, heartbeats and the like.
    pub nodes: Vec<Node>,
}

impl Control {
    pub fn new(cmd: Command) -> Self {
        Self {
            cmd,
            nodes: Vec::new(),
        }
    }

    pub fn with_nodes(cmd: Command, nodes: Vec<Node>) -> Self {
        Self { cmd, nodes }
    }

    /// True for data-plane messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cmd == Command::Empty
    }
}

/// Element type of a payload segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Char = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Other = 11,
}

impl DataType {
    pub const ALL: [DataType; 12] = [
        DataType::Char,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
        DataType::Float,
        DataType::Double,
        DataType::Other,
    ];

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    /// Width in bytes of one element, if fixed.
    pub fn size(self) -> Option<usize> {
        match self {
            DataType::Char | DataType::Int8 | DataType::UInt8 => Some(1),
            DataType::Int16 | DataType::UInt16 => Some(2),
            DataType::Int32 | DataType::UInt32 | DataType::Float => Some(4),
            DataType::Int64 | DataType::UInt64 | DataType::Double => Some(8),
            DataType::Other => None,
        }
    }
}

/// Metadata of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Meta {
    /// Application-defined command head.
    pub head: i32,
    pub body: Option<String>,
    pub control: Control,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub customer_id: i32,
    pub timestamp: i64,
    pub request: bool,
    pub push: bool,
    pub simple_app: bool,
    /// One entry per payload segment of the owning message.
    pub data_type: Vec<DataType>,
}

impl Meta {
    /// Sentinel for unset integer fields such as `timestamp`.
    pub const EMPTY: i32 = i32::MAX;
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            head: Self::EMPTY,
            body: None,
            control: Control::default(),
            sender: NodeId::EMPTY,
            receiver: NodeId::EMPTY,
            customer_id: Self::EMPTY,
            timestamp: Self::EMPTY as i64,
            request: false,
            push: false,
            simple_app: false,
            data_type: Vec::new(),
        }
    }
}
