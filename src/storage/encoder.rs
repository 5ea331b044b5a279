use tracing::trace;

use crate::primitives::io::DataOutput;
use crate::types::{ArborError, NameId, NodeId, Result, UriId};

use super::heap::{HeapKind, HeapStats, ValueHeap};
use super::record::{small_count, NodeRecord, TextKind, MAX_NAME_ID};

/// Appends one fixed-width record per node to the table stream.
///
/// Node ids are handed out in call order starting at 0; every call consumes
/// exactly one id. Sizes are written as 0 and patched after the build.
pub struct RecordEncoder {
    table: DataOutput,
    heap: ValueHeap,
    next: u32,
}

impl RecordEncoder {
    /// Creates an encoder over the table stream and the value heap.
    pub fn new(table: DataOutput, heap: ValueHeap) -> Self {
        Self {
            table,
            heap,
            next: 0,
        }
    }

    /// Number of records appended so far; also the id of the next node.
    pub fn node_count(&self) -> u32 {
        self.next
    }

    /// Bytes appended to one of the heaps.
    pub fn heap_size(&self, kind: HeapKind) -> u64 {
        self.heap.size(kind)
    }

    /// Bytes appended to the table.
    pub fn table_size(&self) -> u64 {
        self.table.size()
    }

    /// Value storage counters.
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Appends a document node whose content is `value` (usually its name).
    pub fn add_document(&mut self, value: &[u8]) -> Result<NodeId> {
        let value = self.heap.store(value, HeapKind::Text)?;
        self.append(NodeRecord::Document { value, size: 0 })
    }

    /// Appends an element node.
    pub fn add_element(
        &mut self,
        dist: u32,
        name: NameId,
        attrs: u32,
        uri: UriId,
        ns: bool,
    ) -> Result<NodeId> {
        check_name(name)?;
        self.append(NodeRecord::Element {
            dist,
            name,
            ns,
            uri,
            attrs: small_count(attrs),
            size: 0,
        })
    }

    /// Appends an attribute node.
    pub fn add_attribute(
        &mut self,
        name: NameId,
        value: &[u8],
        dist: u32,
        uri: UriId,
    ) -> Result<NodeId> {
        check_name(name)?;
        let value = self.heap.store(value, HeapKind::Values)?;
        self.append(NodeRecord::Attribute {
            dist: small_count(dist),
            name,
            value,
            uri,
        })
    }

    /// Appends a text, comment or processing-instruction node.
    pub fn add_text(&mut self, value: &[u8], dist: u32, kind: TextKind) -> Result<NodeId> {
        let value = self.heap.store(value, HeapKind::Text)?;
        self.append(NodeRecord::Text { kind, value, dist })
    }

    fn append(&mut self, record: NodeRecord) -> Result<NodeId> {
        if self.next == u32::MAX {
            return Err(ArborError::Invalid("node table exceeds addressable range"));
        }
        let id = NodeId(self.next);
        self.table.write(&record.encode(id))?;
        self.next += 1;
        trace!(id = id.0, kind = %record.kind(), "encoder.append");
        Ok(id)
    }

    /// Closes the table and both heaps, recording every failure.
    pub fn close(&mut self, failures: &mut Vec<ArborError>) {
        if let Err(err) = self.table.close() {
            failures.push(err);
        }
        self.heap.close(failures);
    }
}

fn check_name(name: NameId) -> Result<()> {
    if name.0 > MAX_NAME_ID {
        return Err(ArborError::Invalid("name id exceeds 15 bits"));
    }
    Ok(())
}
