#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::primitives::bytes::var;
use crate::primitives::io::{DataOutput, FileIo};
use crate::types::{ArborError, Result};

use super::compress::Codec;
use super::options::BuildOptions;
use super::value::{format_inline, parse_inline, ValueRef};

/// Heap a value is appended to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HeapKind {
    /// Document names, text, comment and processing-instruction content.
    Text,
    /// Attribute values.
    Values,
}

/// Counters describing how values were stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapStats {
    /// Values encoded inside their reference
    pub inline_values: u64,
    /// Values appended verbatim
    pub raw_values: u64,
    /// Values appended in compressed form
    pub compressed_values: u64,
    /// Input bytes saved by compression
    pub bytes_saved: u64,
}

/// Append-only store for text and attribute content.
///
/// Each entry is a varint length prefix followed by the stored bytes. Offsets
/// handed out are never reused or moved during a build.
pub struct ValueHeap {
    text: DataOutput,
    values: DataOutput,
    codec: Codec,
    inline_numbers: bool,
    stats: HeapStats,
    scratch: Vec<u8>,
}

impl ValueHeap {
    /// Creates a heap over the two heap streams.
    pub fn new(text: DataOutput, values: DataOutput, opts: &BuildOptions) -> Self {
        Self {
            text,
            values,
            codec: Codec::new(opts.codec, opts.compress_min_len),
            inline_numbers: opts.inline_numbers,
            stats: HeapStats::default(),
            scratch: Vec::new(),
        }
    }

    /// Stores `value` and returns the reference that retrieves it.
    pub fn store(&mut self, value: &[u8], kind: HeapKind) -> Result<ValueRef> {
        if self.inline_numbers {
            if let Some(v) = parse_inline(value) {
                self.stats.inline_values += 1;
                trace!(value = v, "heap.store.inline");
                return Ok(ValueRef::Inline(v));
            }
        }

        let packed = self.codec.pack(value)?;
        let (bytes, compressed) = match packed.as_deref() {
            Some(packed) => (packed, true),
            None => (value, false),
        };

        let out = match kind {
            HeapKind::Text => &mut self.text,
            HeapKind::Values => &mut self.values,
        };
        let reference = ValueRef::heap(out.size(), compressed)?;
        self.scratch.clear();
        var::encode_u64(bytes.len() as u64, &mut self.scratch);
        self.scratch.extend_from_slice(bytes);
        out.write(&self.scratch)?;

        if compressed {
            self.stats.compressed_values += 1;
            self.stats.bytes_saved += (value.len() - bytes.len()) as u64;
        } else {
            self.stats.raw_values += 1;
        }
        trace!(
            ?kind,
            len = value.len(),
            stored = bytes.len(),
            compressed,
            "heap.store.append"
        );
        Ok(reference)
    }

    /// Bytes appended to the given heap so far.
    pub fn size(&self, kind: HeapKind) -> u64 {
        match kind {
            HeapKind::Text => self.text.size(),
            HeapKind::Values => self.values.size(),
        }
    }

    /// Storage counters.
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Closes both heap streams, recording failures instead of stopping at the first.
    pub fn close(&mut self, failures: &mut Vec<ArborError>) {
        if let Err(err) = self.text.close() {
            failures.push(err);
        }
        if let Err(err) = self.values.close() {
            failures.push(err);
        }
    }
}

/// Resolves references against one finished heap file.
pub struct HeapReader {
    io: Box<dyn FileIo>,
    len: u64,
}

impl HeapReader {
    /// Wraps an opened heap file.
    pub fn new(io: Box<dyn FileIo>) -> Result<Self> {
        let len = io.len()?;
        Ok(Self { io, len })
    }

    /// Size of the heap file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if nothing was appended to the heap.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the original bytes behind `reference`.
    pub fn resolve(&self, reference: ValueRef) -> Result<Vec<u8>> {
        match reference {
            ValueRef::Inline(v) => Ok(format_inline(v)),
            ValueRef::Heap { offset, compressed } => {
                let stored = self.read_entry(offset)?;
                if compressed {
                    Codec::unpack(&stored)
                } else {
                    Ok(stored)
                }
            }
        }
    }

    fn read_entry(&self, offset: u64) -> Result<Vec<u8>> {
        if offset >= self.len {
            return Err(ArborError::Corruption("heap offset beyond end of heap"));
        }
        let head_len = (self.len - offset).min(var::MAX_LEN as u64) as usize;
        let mut head = [0u8; var::MAX_LEN];
        self.io.read_at(offset, &mut head[..head_len])?;
        let mut off = 0;
        let len = var::decode_u64(&head[..head_len], &mut off)?;
        let start = offset + off as u64;
        if len > self.len - start {
            return Err(ArborError::Corruption("heap entry extends past end of heap"));
        }
        let mut buf = vec![0u8; len as usize];
        self.io.read_at(start, &mut buf)?;
        Ok(buf)
    }
}
