use serde::{Deserialize, Serialize};
use tracing::debug;

use super::compress::CodecKind;

/// Granularity that output buffers are rounded down to.
pub const BLOCK_SIZE: usize = 1 << 12;

/// Upper bound for a single stream buffer.
pub const MAX_BUFFER: usize = 1 << 22;

/// Configuration options supplied to a build session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Whether small integers are stored inside their value reference
    pub inline_numbers: bool,
    /// Codec applied to heap entries
    pub codec: CodecKind,
    /// Minimum value length before compression is attempted
    pub compress_min_len: usize,
    /// Granularity that stream buffers are rounded down to
    pub block_size: usize,
    /// Largest buffer handed to a single stream
    pub max_buffer: usize,
    /// Memory headroom in bytes; probed from the OS when `None`
    pub memory_headroom: Option<u64>,
    /// Whether whitespace-only text nodes are dropped
    pub chop: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            inline_numbers: true,
            codec: CodecKind::Snappy,
            compress_min_len: 16,
            block_size: BLOCK_SIZE,
            max_buffer: MAX_BUFFER,
            memory_headroom: None,
            chop: true,
        }
    }
}

impl BuildOptions {
    /// Enables or disables inline numeric references.
    pub fn inline_numbers(mut self, enabled: bool) -> Self {
        self.inline_numbers = enabled;
        self
    }

    /// Selects the codec applied to heap entries.
    pub fn codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the minimum value length before compression runs.
    pub fn compress_min_len(mut self, bytes: usize) -> Self {
        self.compress_min_len = bytes;
        self
    }

    /// Sets the buffer rounding granularity.
    pub fn block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes.max(1);
        self
    }

    /// Caps the buffer handed to each stream.
    pub fn max_buffer(mut self, bytes: usize) -> Self {
        self.max_buffer = bytes;
        self
    }

    /// Overrides the memory headroom instead of asking the OS.
    pub fn memory_headroom(mut self, bytes: u64) -> Self {
        self.memory_headroom = Some(bytes);
        self
    }

    /// Enables or disables dropping whitespace-only text.
    pub fn chop(mut self, enabled: bool) -> Self {
        self.chop = enabled;
        self
    }

    /// Memory headroom used for buffer sizing.
    pub fn headroom(&self) -> u64 {
        match self.memory_headroom {
            Some(bytes) => bytes,
            None => {
                let mut sys = sysinfo::System::new();
                sys.refresh_memory();
                let available = sys.available_memory();
                debug!(available, "options.headroom.probed");
                available
            }
        }
    }

    /// Buffer size for each build stream.
    ///
    /// Bounded by a quarter of the headroom, by `max_buffer` and by the
    /// expected output size, then rounded down to whole blocks (at least one).
    pub fn buffer_size(&self, expected_bytes: u64) -> usize {
        let block = self.block_size.max(1) as u64;
        let cap = (self.max_buffer as u64).min(self.headroom() >> 2);
        let bs = expected_bytes.min(cap);
        let rounded = (bs - bs % block).max(block);
        usize::try_from(rounded).unwrap_or(self.block_size)
    }
}
