//! Low-level primitives for building the storage engine.
//!
//! Includes byte encodings and the file I/O seams used by the builder.

/// Byte-level utilities and encoding/decoding.
///
/// Varints for heap length prefixes and ledger entries, plus the fixed-width
/// big-endian fields of the node table.
pub mod bytes;

/// I/O abstractions and utilities.
///
/// Positioned file access, buffered append streams and storage locations.
pub mod io;
