//! Physical storage format and the components that write it.
//!
//! A database is one fixed-width node table plus two append-only heaps. The
//! table is appended in document order with placeholder sizes, which the size
//! patcher fills in from the ledger once the append phase is complete.

/// Name and namespace dictionaries.
///
/// Maps qualified names and namespace uris to the compact ids stored in records.
pub mod catalog;

/// Codec applied to heap entries.
pub mod compress;

/// Record encoder appending one row per node.
pub mod encoder;

/// Append-only value heaps and their reader.
pub mod heap;

/// Size ledger and the patch pass that consumes it.
pub mod ledger;

/// Database metadata and the info file.
pub mod meta;

/// Build configuration and buffer sizing.
pub mod options;

/// Fixed-width node records.
pub mod record;

/// 40-bit value references.
pub mod value;

pub use catalog::{Names, Namespaces, NsBinding, XML_URI};
pub use compress::{Codec, CodecKind};
pub use encoder::RecordEncoder;
pub use heap::{HeapKind, HeapReader, HeapStats, ValueHeap};
pub use ledger::{SizeLedger, SizePatcher};
pub use meta::{DbInfo, MetaData, SourceInfo, FORMAT_VERSION};
pub use options::{BuildOptions, BLOCK_SIZE, MAX_BUFFER};
pub use record::{NodeRecord, TextKind, NODE_SIZE};
pub use value::ValueRef;
