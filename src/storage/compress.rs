use serde::{Deserialize, Serialize};

use crate::types::{ArborError, Result};

/// Codec applied to heap entries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Store values verbatim.
    None,
    /// Raw Snappy blocks.
    #[default]
    Snappy,
}

/// Packs heap values with the configured codec.
///
/// A packed form is only kept when it is strictly shorter than the input.
#[derive(Clone, Debug)]
pub struct Codec {
    kind: CodecKind,
    min_len: usize,
}

impl Codec {
    /// Creates a codec that leaves values shorter than `min_len` alone.
    pub fn new(kind: CodecKind, min_len: usize) -> Self {
        Self { kind, min_len }
    }

    /// Selected codec.
    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// Returns the packed form of `raw`, or `None` if it would not shrink.
    pub fn pack(&self, raw: &[u8]) -> Result<Option<Vec<u8>>> {
        if raw.len() < self.min_len {
            return Ok(None);
        }
        match self.kind {
            CodecKind::None => Ok(None),
            CodecKind::Snappy => {
                let packed = snap::raw::Encoder::new()
                    .compress_vec(raw)
                    .map_err(|_| ArborError::Invalid("value too large to compress"))?;
                Ok((packed.len() < raw.len()).then_some(packed))
            }
        }
    }

    /// Reverses [`Codec::pack`]. Entries are always Snappy when flagged compressed.
    pub fn unpack(packed: &[u8]) -> Result<Vec<u8>> {
        snap::raw::Decoder::new()
            .decompress_vec(packed)
            .map_err(|_| ArborError::Corruption("compressed heap entry is invalid"))
    }
}
