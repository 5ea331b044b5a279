#![forbid(unsafe_code)]

use std::io::Read;

use tracing::{debug, trace};

use crate::primitives::bytes::var;
use crate::primitives::io::{DataOutput, FileIo};
use crate::types::{ArborError, NodeId, NodeKind, Result, StreamKind};

use super::record::{layout, KIND_MASK, SIZE_OFFSET};

/// Append-only side stream of (node id, subtree size) pairs.
///
/// Entries arrive in subtree closing order, so ids are not monotonic; the
/// patch pass does not depend on their order.
pub struct SizeLedger {
    out: DataOutput,
    entries: u64,
}

impl SizeLedger {
    /// Creates a ledger over the ledger stream.
    pub fn new(out: DataOutput) -> Self {
        Self { out, entries: 0 }
    }

    /// Records the final size of the container stored at `pre`.
    pub fn record_size(&mut self, pre: NodeId, size: u32) -> Result<()> {
        self.out.write_num(u64::from(pre.0))?;
        self.out.write_num(u64::from(size))?;
        self.entries += 1;
        trace!(pre = pre.0, size, "ledger.record");
        Ok(())
    }

    /// Entries recorded so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Flushes and releases the ledger stream; repeated calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        self.out.close()
    }
}

/// Second pass that overwrites placeholder sizes in a finished table.
pub struct SizePatcher<'a> {
    table: &'a dyn FileIo,
    node_count: u32,
}

impl<'a> SizePatcher<'a> {
    /// Patches `table`, which holds `node_count` records.
    pub fn new(table: &'a dyn FileIo, node_count: u32) -> Self {
        Self { table, node_count }
    }

    /// Replays `ledger` in write order and syncs the table.
    ///
    /// Fails unless exactly `expected` well-formed entries are applied.
    pub fn apply<R: Read>(&self, ledger: &mut R, expected: u64) -> Result<u64> {
        let mut applied = 0u64;
        let fail = |applied: u64, source: ArborError| ArborError::Patch {
            applied,
            total: expected,
            source: Box::new(source),
        };
        loop {
            let Some(pre) = read_field(ledger).map_err(|err| fail(applied, err))? else {
                break;
            };
            let size = match read_field(ledger) {
                Ok(Some(size)) => size,
                Ok(None) => {
                    return Err(fail(
                        applied,
                        ArborError::Corruption("ledger entry missing its size"),
                    ))
                }
                Err(err) => return Err(fail(applied, err)),
            };
            if applied == expected {
                return Err(fail(
                    applied,
                    ArborError::Corruption("ledger holds more entries than recorded"),
                ));
            }
            let (pre, size) = match (u32::try_from(pre), u32::try_from(size)) {
                (Ok(pre), Ok(size)) if pre < self.node_count => (pre, size),
                _ => {
                    return Err(fail(
                        applied,
                        ArborError::Corruption("ledger entry outside the table"),
                    ))
                }
            };
            let row = NodeId(pre).table_offset();
            let mut head = [0u8; 1];
            self.table
                .read_at(row + layout::KIND as u64, &mut head)
                .map_err(|err| fail(applied, on_table(err)))?;
            let kind =
                NodeKind::try_from(head[0] & KIND_MASK).map_err(|err| fail(applied, err))?;
            if !kind.is_container() {
                return Err(fail(
                    applied,
                    ArborError::Corruption("ledger entry points at a node without a size"),
                ));
            }
            self.table
                .write_at(row + SIZE_OFFSET, &size.to_be_bytes())
                .map_err(|err| fail(applied, on_table(err)))?;
            applied += 1;
        }
        if applied != expected {
            return Err(fail(
                applied,
                ArborError::Corruption("ledger holds fewer entries than recorded"),
            ));
        }
        self.table
            .sync_all()
            .map_err(|err| fail(applied, on_table(err)))?;
        debug!(applied, "ledger.patch.complete");
        Ok(applied)
    }
}

fn on_table(err: ArborError) -> ArborError {
    match err {
        ArborError::Io(err) => ArborError::stream(StreamKind::Table, err),
        other => other,
    }
}

fn read_field<R: Read>(ledger: &mut R) -> Result<Option<u64>> {
    var::read_u64(ledger).map_err(|err| ArborError::stream(StreamKind::Ledger, err))
}
