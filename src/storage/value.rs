//! 40-bit value references stored in document, text and attribute records.
//!
//! ```text
//! bit 39      bit 38       bits 37..0
//! inline=1    payload (39-bit two's complement integer)
//! inline=0    compressed   heap byte offset
//! ```

use crate::primitives::bytes::be::U40_MAX;
use crate::types::{ArborError, Result};

/// Tag bit marking an inline numeric reference.
pub const OFF_NUM: u64 = 1 << 39;
/// Tag bit marking a compressed heap entry.
pub const OFF_COMP: u64 = 1 << 38;

const INLINE_MASK: u64 = OFF_NUM - 1;
const OFFSET_MASK: u64 = OFF_COMP - 1;
const INLINE_SHIFT: u32 = 64 - 39;

/// Most digits an inline value may carry.
pub const INLINE_DIGITS: usize = 9;

/// Decoded value reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueRef {
    /// Integer stored in the reference itself.
    Inline(i64),
    /// Entry in one of the heaps.
    Heap {
        /// Byte offset of the entry's length prefix.
        offset: u64,
        /// Whether the stored bytes are compressed.
        compressed: bool,
    },
}

impl ValueRef {
    /// Largest heap offset a reference can address.
    pub const MAX_OFFSET: u64 = OFFSET_MASK;

    /// Builds a heap reference, rejecting offsets beyond the reference width.
    pub fn heap(offset: u64, compressed: bool) -> Result<Self> {
        if offset > Self::MAX_OFFSET {
            return Err(ArborError::Invalid("heap offset exceeds reference range"));
        }
        Ok(ValueRef::Heap { offset, compressed })
    }

    /// Packs the reference into its 40-bit wire form.
    pub fn encode(self) -> u64 {
        match self {
            ValueRef::Inline(v) => OFF_NUM | (v as u64 & INLINE_MASK),
            ValueRef::Heap { offset, compressed } => {
                let tag = if compressed { OFF_COMP } else { 0 };
                tag | (offset & OFFSET_MASK)
            }
        }
    }

    /// Unpacks a 40-bit wire reference.
    pub fn decode(raw: u64) -> Result<Self> {
        if raw > U40_MAX {
            return Err(ArborError::Corruption("value reference exceeds 40 bits"));
        }
        if raw & OFF_NUM != 0 {
            let v = (((raw & INLINE_MASK) << INLINE_SHIFT) as i64) >> INLINE_SHIFT;
            return Ok(ValueRef::Inline(v));
        }
        Ok(ValueRef::Heap {
            offset: raw & OFFSET_MASK,
            compressed: raw & OFF_COMP != 0,
        })
    }

    /// Returns true if no heap entry backs this reference.
    pub fn is_inline(self) -> bool {
        matches!(self, ValueRef::Inline(_))
    }
}

/// Parses `value` as an inline integer.
///
/// Accepts an optional `-` followed by one to nine digits without leading
/// zeros; `0` is accepted, `-0` is not. Anything accepted formats back to
/// exactly the same bytes.
pub fn parse_inline(value: &[u8]) -> Option<i64> {
    let (negative, digits) = match value.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some(_) => (false, value),
        None => return None,
    };
    if digits.is_empty() || digits.len() > INLINE_DIGITS {
        return None;
    }
    if digits[0] == b'0' && (digits.len() > 1 || negative) {
        return None;
    }
    let mut v = 0i64;
    for &c in digits {
        if !c.is_ascii_digit() {
            return None;
        }
        v = v * 10 + i64::from(c - b'0');
    }
    Some(if negative { -v } else { v })
}

/// Formats an inline integer back to its textual form.
pub fn format_inline(v: i64) -> Vec<u8> {
    v.to_string().into_bytes()
}
