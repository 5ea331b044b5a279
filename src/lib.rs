//! Disk builder for fixed-width tree tables.
//!
//! Parser events are written in document order to a table of 16-byte node
//! records plus two append-only value heaps. Subtree sizes are patched in a
//! second pass from a transient ledger, so a finished table is either complete
//! or never reported as built.

#![warn(missing_docs)]

pub mod build;
pub mod cli;
pub mod data;
pub mod primitives;
pub mod storage;
pub mod types;

pub use build::{Builder, DiskBuilder, Parser};
pub use data::DiskData;
pub use types::{ArborError, NameId, NodeId, NodeKind, Result, UriId};
