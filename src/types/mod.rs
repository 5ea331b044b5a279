#![forbid(unsafe_code)]
//! Identifiers, node kinds and the crate-wide error type.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Document-order rank of a node; doubles as its row in the node table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// Dictionary id of an element or attribute name. `0` means "no name".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameId(pub u16);

/// Dictionary id of a namespace uri. `0` means "no namespace".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UriId(pub u8);

impl NodeId {
    /// Byte offset of this node's record inside the table file.
    pub fn table_offset(self) -> u64 {
        u64::from(self.0) * crate::storage::NODE_SIZE as u64
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UriId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId(value)
    }
}

impl From<NodeId> for u32 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

/// Kind of a stored node. The discriminant is the on-disk kind code.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NodeKind {
    /// Document node.
    Document = 0,
    /// Element node.
    Element = 1,
    /// Text node.
    Text = 2,
    /// Attribute node.
    Attribute = 3,
    /// Comment node.
    Comment = 4,
    /// Processing instruction.
    ProcessingInstruction = 5,
}

impl NodeKind {
    /// Returns the on-disk kind code.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Container kinds own a subtree size.
    pub const fn is_container(self) -> bool {
        matches!(self, NodeKind::Document | NodeKind::Element)
    }
}

impl TryFrom<u8> for NodeKind {
    type Error = ArborError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(NodeKind::Document),
            1 => Ok(NodeKind::Element),
            2 => Ok(NodeKind::Text),
            3 => Ok(NodeKind::Attribute),
            4 => Ok(NodeKind::Comment),
            5 => Ok(NodeKind::ProcessingInstruction),
            _ => Err(ArborError::Corruption("unknown node kind")),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Document => "document",
            NodeKind::Element => "element",
            NodeKind::Text => "text",
            NodeKind::Attribute => "attribute",
            NodeKind::Comment => "comment",
            NodeKind::ProcessingInstruction => "processing-instruction",
        };
        f.pad(name)
    }
}

/// The four streams a build session writes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StreamKind {
    /// Fixed-width node table.
    Table,
    /// Heap for document and text content.
    Text,
    /// Heap for attribute values.
    Values,
    /// Transient (node-id, size) ledger.
    Ledger,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Table => "table",
            StreamKind::Text => "text heap",
            StreamKind::Values => "value heap",
            StreamKind::Ledger => "size ledger",
        };
        f.write_str(name)
    }
}

/// Errors raised while building or reading a table.
#[derive(thiserror::Error, Debug)]
pub enum ArborError {
    /// Untagged I/O failure (metadata files, directory handling).
    #[error("IO: {0}")]
    Io(#[from] io::Error),
    /// I/O failure on one of the build streams.
    #[error("{stream} stream: {source}")]
    Stream {
        /// Stream that failed.
        stream: StreamKind,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Malformed or unreadable input reported by a parser.
    #[error("parse: {0}")]
    Parse(String),
    /// The target location or its buffers could not be set up.
    #[error("resource: {0}")]
    Resource(String),
    /// The size patch pass did not complete; the table must not be used.
    #[error("size patch failed after {applied} of {total} entries: {source}")]
    Patch {
        /// Entries applied before the failure.
        applied: u64,
        /// Entries recorded in the ledger.
        total: u64,
        /// Underlying failure.
        #[source]
        source: Box<ArborError>,
    },
    /// One or more streams failed to close.
    #[error("{}", describe_close_failures(.0))]
    Close(Vec<ArborError>),
    /// Stored data does not match the expected layout.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller supplied an argument outside the supported range.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// The build session was already closed.
    #[error("build session closed")]
    Closed,
    /// Requested item does not exist.
    #[error("not found")]
    NotFound,
}

impl ArborError {
    /// Wraps an I/O failure with the stream it happened on.
    pub fn stream(stream: StreamKind, source: io::Error) -> Self {
        ArborError::Stream { stream, source }
    }
}

fn describe_close_failures(failures: &[ArborError]) -> String {
    match failures.first() {
        Some(first) => format!(
            "{} stream(s) failed to close; first: {first}",
            failures.len()
        ),
        None => "stream close failed".to_string(),
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArborError>;
