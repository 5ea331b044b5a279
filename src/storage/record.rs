use crate::primitives::bytes::be;
use crate::types::{ArborError, NameId, NodeId, NodeKind, Result, UriId};

use super::value::ValueRef;

/// Width of one node record.
pub const NODE_SIZE: usize = 16;

/// Offset of the size field inside a container record.
pub const SIZE_OFFSET: u64 = 8;

/// Largest count that fits the 5-bit field in byte 0.
pub const MAX_SMALL_COUNT: u32 = 0x1F;

/// Largest name id; bit 15 of the name field is the namespace flag.
pub const MAX_NAME_ID: u16 = 0x7FFF;

pub(crate) const KIND_MASK: u8 = 0x07;
const NS_FLAG: u16 = 1 << 15;

pub mod layout {
    //! Byte ranges of the record fields.
    use core::ops::Range;

    /// Kind code in the low three bits, small count above it.
    pub const KIND: usize = 0;
    /// Name id of elements and attributes.
    pub const NAME: Range<usize> = 1..3;
    /// Namespace uri id of elements.
    pub const URI: usize = 3;
    /// 40-bit content reference.
    pub const REF: Range<usize> = 3..8;
    /// Parent distance of elements.
    pub const DIST: Range<usize> = 4..8;
    /// Subtree size of documents and elements.
    pub const SIZE: Range<usize> = 8..12;
    /// Parent distance of text kinds, uri id of attributes.
    pub const TAIL: Range<usize> = 8..12;
    /// Node id.
    pub const ID: Range<usize> = 12..16;
}

/// Kinds that carry a content reference and a parent distance.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TextKind {
    /// Text node.
    Text,
    /// Comment.
    Comment,
    /// Processing instruction.
    ProcessingInstruction,
}

impl TextKind {
    /// Node kind stored for this text kind.
    pub const fn node_kind(self) -> NodeKind {
        match self {
            TextKind::Text => NodeKind::Text,
            TextKind::Comment => NodeKind::Comment,
            TextKind::ProcessingInstruction => NodeKind::ProcessingInstruction,
        }
    }
}

/// One decoded table row.
///
/// Each kind owns its fields; they share bytes only in the wire form.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeRecord {
    /// Document node.
    Document {
        /// Reference to the document name.
        value: ValueRef,
        /// Rows in the subtree below this node.
        size: u32,
    },
    /// Element node.
    Element {
        /// Rows back to the parent; 0 for a top-level element.
        dist: u32,
        /// Element name.
        name: NameId,
        /// Whether namespaces are declared on this element.
        ns: bool,
        /// Namespace of the element name.
        uri: UriId,
        /// Attribute count, saturating at [`MAX_SMALL_COUNT`].
        attrs: u8,
        /// Rows in the subtree below this node.
        size: u32,
    },
    /// Text, comment or processing instruction.
    Text {
        /// Which of the three kinds.
        kind: TextKind,
        /// Reference to the content.
        value: ValueRef,
        /// Rows back to the parent; 0 for top-level nodes.
        dist: u32,
    },
    /// Attribute node.
    Attribute {
        /// Rows back to the owning element, saturating at [`MAX_SMALL_COUNT`].
        dist: u8,
        /// Attribute name.
        name: NameId,
        /// Reference to the value.
        value: ValueRef,
        /// Namespace of the attribute name.
        uri: UriId,
    },
}

impl NodeRecord {
    /// Stored kind.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRecord::Document { .. } => NodeKind::Document,
            NodeRecord::Element { .. } => NodeKind::Element,
            NodeRecord::Text { kind, .. } => kind.node_kind(),
            NodeRecord::Attribute { .. } => NodeKind::Attribute,
        }
    }

    /// Subtree size for containers, 0 otherwise.
    pub fn size(&self) -> u32 {
        match self {
            NodeRecord::Document { size, .. } | NodeRecord::Element { size, .. } => *size,
            _ => 0,
        }
    }

    /// Stored parent distance (saturated for attributes), `None` for documents.
    pub fn dist(&self) -> Option<u32> {
        match self {
            NodeRecord::Document { .. } => None,
            NodeRecord::Element { dist, .. } | NodeRecord::Text { dist, .. } => Some(*dist),
            NodeRecord::Attribute { dist, .. } => Some(u32::from(*dist)),
        }
    }

    /// Content reference for kinds that carry one.
    pub fn value(&self) -> Option<ValueRef> {
        match self {
            NodeRecord::Document { value, .. }
            | NodeRecord::Text { value, .. }
            | NodeRecord::Attribute { value, .. } => Some(*value),
            NodeRecord::Element { .. } => None,
        }
    }

    /// Name id for elements and attributes.
    pub fn name(&self) -> Option<NameId> {
        match self {
            NodeRecord::Element { name, .. } | NodeRecord::Attribute { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Serializes the row stored for node `id`.
    pub fn encode(&self, id: NodeId) -> [u8; NODE_SIZE] {
        let mut buf = [0u8; NODE_SIZE];
        match *self {
            NodeRecord::Document { value, size } => {
                buf[layout::KIND] = NodeKind::Document.as_u8();
                be::put_u40(&mut buf[layout::REF], value.encode());
                be::put_u32(&mut buf[layout::SIZE], size);
            }
            NodeRecord::Element {
                dist,
                name,
                ns,
                uri,
                attrs,
                size,
            } => {
                buf[layout::KIND] = small_count(u32::from(attrs)) << 3 | NodeKind::Element.as_u8();
                let flag = if ns { NS_FLAG } else { 0 };
                be::put_u16(&mut buf[layout::NAME], flag | (name.0 & MAX_NAME_ID));
                buf[layout::URI] = uri.0;
                be::put_u32(&mut buf[layout::DIST], dist);
                be::put_u32(&mut buf[layout::SIZE], size);
            }
            NodeRecord::Text { kind, value, dist } => {
                buf[layout::KIND] = kind.node_kind().as_u8();
                be::put_u40(&mut buf[layout::REF], value.encode());
                be::put_u32(&mut buf[layout::TAIL], dist);
            }
            NodeRecord::Attribute {
                dist,
                name,
                value,
                uri,
            } => {
                buf[layout::KIND] = small_count(u32::from(dist)) << 3 | NodeKind::Attribute.as_u8();
                be::put_u16(&mut buf[layout::NAME], name.0 & MAX_NAME_ID);
                be::put_u40(&mut buf[layout::REF], value.encode());
                be::put_u32(&mut buf[layout::TAIL], u32::from(uri.0));
            }
        }
        be::put_u32(&mut buf[layout::ID], id.0);
        buf
    }

    /// Parses one row, returning the stored node id with the record.
    pub fn decode(buf: &[u8; NODE_SIZE]) -> Result<(NodeId, NodeRecord)> {
        let head = buf[layout::KIND];
        let small = head >> 3;
        let id = NodeId(be::get_u32(&buf[layout::ID]));
        let record = match NodeKind::try_from(head & KIND_MASK)? {
            NodeKind::Document => NodeRecord::Document {
                value: ValueRef::decode(be::get_u40(&buf[layout::REF]))?,
                size: be::get_u32(&buf[layout::SIZE]),
            },
            NodeKind::Element => {
                let name = be::get_u16(&buf[layout::NAME]);
                NodeRecord::Element {
                    dist: be::get_u32(&buf[layout::DIST]),
                    name: NameId(name & MAX_NAME_ID),
                    ns: name & NS_FLAG != 0,
                    uri: UriId(buf[layout::URI]),
                    attrs: small,
                    size: be::get_u32(&buf[layout::SIZE]),
                }
            }
            NodeKind::Attribute => {
                let uri = be::get_u32(&buf[layout::TAIL]);
                NodeRecord::Attribute {
                    dist: small,
                    name: NameId(be::get_u16(&buf[layout::NAME]) & MAX_NAME_ID),
                    value: ValueRef::decode(be::get_u40(&buf[layout::REF]))?,
                    uri: UriId(
                        u8::try_from(uri)
                            .map_err(|_| ArborError::Corruption("attribute uri id out of range"))?,
                    ),
                }
            }
            kind => NodeRecord::Text {
                kind: match kind {
                    NodeKind::Comment => TextKind::Comment,
                    NodeKind::ProcessingInstruction => TextKind::ProcessingInstruction,
                    _ => TextKind::Text,
                },
                value: ValueRef::decode(be::get_u40(&buf[layout::REF]))?,
                dist: be::get_u32(&buf[layout::TAIL]),
            },
        };
        Ok((id, record))
    }
}

/// Clamps a count to the 5-bit field in byte 0.
pub fn small_count(n: u32) -> u8 {
    n.min(MAX_SMALL_COUNT) as u8
}
