use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::data::{table_checksum, DiskData};
use crate::primitives::io::{DataOutput, DbFile, Location};
use crate::storage::{
    BuildOptions, DbInfo, MetaData, RecordEncoder, SizeLedger, SizePatcher, ValueHeap,
};
use crate::types::{ArborError, Result, StreamKind};

use super::{BuiltTree, Builder, Parser};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SessionState {
    Ready,
    Building,
    Closed,
}

/// One build session writing a database to disk.
///
/// A session builds at most once. `close` is idempotent and `abort` may be
/// called at any point; after either, the session cannot be used again.
pub struct DiskBuilder<P: Parser> {
    location: Arc<dyn Location>,
    parser: P,
    opts: BuildOptions,
    meta: MetaData,
    builder: Option<Builder>,
    state: SessionState,
}

impl<P: Parser> DiskBuilder<P> {
    /// Prepares a session building database `name` at `location` from `parser`.
    pub fn new(
        name: impl Into<String>,
        location: Arc<dyn Location>,
        parser: P,
        opts: BuildOptions,
    ) -> Self {
        let meta = MetaData::new(name, &opts);
        Self {
            location,
            parser,
            opts,
            meta,
            builder: None,
            state: SessionState::Ready,
        }
    }

    /// Metadata of the session; complete once `build` has returned.
    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    /// Parser feeding the session.
    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Returns true once the session was closed or aborted.
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Runs the build and returns the finished database.
    ///
    /// Whatever was stored at the location before is destroyed. On failure
    /// all streams are closed and the partial files are left in place.
    pub fn build(&mut self) -> Result<DiskData> {
        if self.state != SessionState::Ready {
            return Err(ArborError::Closed);
        }
        self.state = SessionState::Building;
        self.meta.assign(&self.parser.info());
        self.meta.dirty = true;
        info!(
            name = %self.meta.name,
            location = %self.location.describe(),
            filesize = self.meta.filesize,
            "build.start"
        );

        match self.append_phase() {
            Ok(()) => {}
            Err(err) => {
                if let Err(secondary) = self.close() {
                    debug!(error = %secondary, "build.close.secondary");
                }
                warn!(error = %err, "build.failed");
                return Err(err);
            }
        }
        self.close()?;

        let tree = self
            .builder
            .take()
            .ok_or(ArborError::Closed)?
            .into_tree();
        self.patch(&tree)?;
        self.location.remove(DbFile::Ledger)?;
        self.finish(tree)
    }

    /// Closes every stream and the parser without patching.
    ///
    /// Close failures are logged, not returned.
    pub fn abort(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "build.abort.close_failed");
        }
        debug!(name = %self.meta.name, "build.abort");
    }

    /// Closes every stream and the parser once; later calls do nothing.
    ///
    /// Each stream is closed even if an earlier one failed; all failures are
    /// reported together.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        let mut failures = Vec::new();
        if let Some(builder) = self.builder.as_mut() {
            builder.close_streams(&mut failures);
        }
        if let Err(err) = self.parser.close() {
            failures.push(err);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ArborError::Close(failures))
        }
    }

    fn append_phase(&mut self) -> Result<()> {
        let buffer = self.opts.buffer_size(self.meta.filesize);
        debug!(buffer, "build.buffer");

        self.location.prepare()?;
        DbInfo::pending(self.meta.clone()).write(self.location.as_ref())?;

        let location = Arc::clone(&self.location);
        let open = |file: DbFile, stream: StreamKind| -> Result<DataOutput> {
            Ok(DataOutput::new(stream, location.create(file)?, buffer))
        };
        let table = open(DbFile::Table, StreamKind::Table)?;
        let text = open(DbFile::Text, StreamKind::Text)?;
        let values = open(DbFile::Values, StreamKind::Values)?;
        let ledger = open(DbFile::Ledger, StreamKind::Ledger)?;

        let heap = ValueHeap::new(text, values, &self.opts);
        let encoder = RecordEncoder::new(table, heap);
        let builder = self.builder.insert(Builder::new(
            encoder,
            SizeLedger::new(ledger),
            self.opts.chop,
        ));

        self.parser.parse(builder)?;
        builder.finish()?;
        debug!(nodes = builder.node_count(), "build.parse.complete");
        Ok(())
    }

    fn patch(&self, tree: &BuiltTree) -> Result<()> {
        let wrap = |source: ArborError| ArborError::Patch {
            applied: 0,
            total: tree.ledger_entries,
            source: Box::new(source),
        };
        let table = self
            .location
            .open_random(DbFile::Table, true)
            .map_err(wrap)?;
        let mut ledger = self.location.open_read(DbFile::Ledger).map_err(wrap)?;
        let applied = SizePatcher::new(table.as_ref(), tree.node_count)
            .apply(&mut ledger, tree.ledger_entries)?;
        info!(applied, "build.patch.complete");
        Ok(())
    }

    fn finish(&mut self, tree: BuiltTree) -> Result<DiskData> {
        self.meta.size = tree.node_count;
        self.meta.text_bytes = tree.text_bytes;
        self.meta.value_bytes = tree.value_bytes;
        self.meta.heap = tree.heap;
        self.meta.table_crc32 = table_checksum(self.location.as_ref())?;
        self.meta.dirty = false;

        let info = DbInfo {
            meta: self.meta.clone(),
            elem_names: tree.elem_names,
            attr_names: tree.attr_names,
            namespaces: tree.namespaces,
        };
        info.write(self.location.as_ref())?;
        info!(
            name = %self.meta.name,
            nodes = self.meta.size,
            text_bytes = self.meta.text_bytes,
            value_bytes = self.meta.value_bytes,
            "build.complete"
        );
        DiskData::open(Arc::clone(&self.location))
    }
}

impl<P: Parser> Drop for DiskBuilder<P> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            self.abort();
        }
    }
}
