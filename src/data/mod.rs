#![forbid(unsafe_code)]

//! Read access to a finished database.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::primitives::io::{DbFile, FileIo, Location};
use crate::storage::record::MAX_SMALL_COUNT;
use crate::storage::{DbInfo, HeapReader, MetaData, Names, Namespaces, NodeRecord, NODE_SIZE};
use crate::types::{ArborError, NodeId, NodeKind, Result, StreamKind};

/// Immutable handle on a completely built database.
pub struct DiskData {
    location: Arc<dyn Location>,
    info: DbInfo,
    table: Box<dyn FileIo>,
    text: HeapReader,
    values: HeapReader,
}

impl DiskData {
    /// Opens the database stored at `location`.
    ///
    /// Fails with [`ArborError::NotFound`] if no build ever finished there and
    /// with [`ArborError::Corruption`] if the last build did not complete.
    pub fn open(location: Arc<dyn Location>) -> Result<Self> {
        let info = DbInfo::read(location.as_ref())?;
        if info.meta.dirty {
            return Err(ArborError::Corruption("database build did not complete"));
        }
        let table = location.open_random(DbFile::Table, false)?;
        let expected = u64::from(info.meta.size) * NODE_SIZE as u64;
        if table.len()? != expected {
            return Err(ArborError::Corruption("table length does not match node count"));
        }
        let text = HeapReader::new(location.open_random(DbFile::Text, false)?)?;
        let values = HeapReader::new(location.open_random(DbFile::Values, false)?)?;
        debug!(
            location = %location.describe(),
            nodes = info.meta.size,
            "data.open"
        );
        Ok(Self {
            location,
            info,
            table,
            text,
            values,
        })
    }

    /// Database properties.
    pub fn meta(&self) -> &MetaData {
        &self.info.meta
    }

    /// Element name dictionary.
    pub fn elem_names(&self) -> &Names {
        &self.info.elem_names
    }

    /// Attribute name dictionary.
    pub fn attr_names(&self) -> &Names {
        &self.info.attr_names
    }

    /// Namespace uris and bindings.
    pub fn namespaces(&self) -> &Namespaces {
        &self.info.namespaces
    }

    /// Number of rows.
    pub fn size(&self) -> u32 {
        self.info.meta.size
    }

    /// Raw bytes of row `pre`.
    pub fn raw(&self, pre: NodeId) -> Result<[u8; NODE_SIZE]> {
        if pre.0 >= self.size() {
            return Err(ArborError::NotFound);
        }
        let mut buf = [0u8; NODE_SIZE];
        self.table.read_at(pre.table_offset(), &mut buf)?;
        Ok(buf)
    }

    /// Decoded row `pre`.
    pub fn record(&self, pre: NodeId) -> Result<NodeRecord> {
        let (id, record) = NodeRecord::decode(&self.raw(pre)?)?;
        if id != pre {
            return Err(ArborError::Corruption("stored node id differs from its row"));
        }
        Ok(record)
    }

    /// Kind of node `pre`.
    pub fn kind(&self, pre: NodeId) -> Result<NodeKind> {
        Ok(self.record(pre)?.kind())
    }

    /// Rows in the subtree below `pre`; 0 for leaves.
    pub fn subtree_size(&self, pre: NodeId) -> Result<u32> {
        Ok(self.record(pre)?.size())
    }

    /// Parent of `pre`, or `None` for documents and top-level nodes.
    pub fn parent(&self, pre: NodeId) -> Result<Option<NodeId>> {
        let record = self.record(pre)?;
        match record {
            NodeRecord::Attribute { dist, .. } if u32::from(dist) == MAX_SMALL_COUNT => {
                // Attributes directly follow their element.
                let mut row = pre.0;
                while row > 0 {
                    row -= 1;
                    if self.kind(NodeId(row))? == NodeKind::Element {
                        return Ok(Some(NodeId(row)));
                    }
                }
                Err(ArborError::Corruption("attribute without an owning element"))
            }
            _ => match record.dist() {
                None | Some(0) => Ok(None),
                Some(dist) => pre
                    .0
                    .checked_sub(dist)
                    .map(|row| Some(NodeId(row)))
                    .ok_or(ArborError::Corruption("parent distance points before the table")),
            },
        }
    }

    /// Number of attributes of element `pre`.
    pub fn attr_count(&self, pre: NodeId) -> Result<u32> {
        match self.record(pre)? {
            NodeRecord::Element { attrs, .. } if u32::from(attrs) < MAX_SMALL_COUNT => {
                Ok(u32::from(attrs))
            }
            NodeRecord::Element { .. } => {
                let mut count = 0;
                let mut row = pre.0 + 1;
                while row < self.size() && self.kind(NodeId(row))? == NodeKind::Attribute {
                    count += 1;
                    row += 1;
                }
                Ok(count)
            }
            _ => Ok(0),
        }
    }

    /// Qualified name of an element or attribute.
    pub fn name(&self, pre: NodeId) -> Result<Option<&str>> {
        let record = self.record(pre)?;
        let names = match record.kind() {
            NodeKind::Element => &self.info.elem_names,
            NodeKind::Attribute => &self.info.attr_names,
            _ => return Ok(None),
        };
        match record.name() {
            Some(id) => names
                .name(id)
                .map(Some)
                .ok_or(ArborError::Corruption("name id missing from dictionary")),
            None => Ok(None),
        }
    }

    /// Namespace uri of an element or attribute.
    pub fn uri(&self, pre: NodeId) -> Result<Option<&str>> {
        let uri = match self.record(pre)? {
            NodeRecord::Element { uri, .. } | NodeRecord::Attribute { uri, .. } => uri,
            _ => return Ok(None),
        };
        if uri.0 == 0 {
            return Ok(None);
        }
        self.info
            .namespaces
            .uri(uri)
            .map(Some)
            .ok_or(ArborError::Corruption("uri id missing from dictionary"))
    }

    /// Content of a document, text, comment, processing instruction or
    /// attribute node; `None` for elements.
    pub fn value(&self, pre: NodeId) -> Result<Option<Vec<u8>>> {
        let record = self.record(pre)?;
        let Some(reference) = record.value() else {
            return Ok(None);
        };
        let heap = match record.kind() {
            NodeKind::Attribute => &self.values,
            _ => &self.text,
        };
        heap.resolve(reference).map(Some)
    }

    /// Checks the table against the checksum and the structural invariants.
    pub fn verify(&self) -> Result<()> {
        if table_checksum(self.location.as_ref())? != self.info.meta.table_crc32 {
            warn!(location = %self.location.describe(), "data.verify.checksum");
            return Err(ArborError::Corruption("table checksum mismatch"));
        }

        let count = self.size();
        for row in 0..count {
            let pre = NodeId(row);
            let record = self.record(pre)?;
            if u64::from(row) + u64::from(record.size()) >= u64::from(count) {
                return Err(ArborError::Corruption("subtree extends past the table"));
            }
            if let Some(parent) = self.parent(pre)? {
                let owner = self.record(parent)?;
                if !owner.kind().is_container() || row > parent.0 + owner.size() {
                    return Err(ArborError::Corruption("node lies outside its parent"));
                }
            }
        }
        debug!(nodes = count, "data.verify.ok");
        Ok(())
    }
}

/// CRC32 over the whole table file at `location`.
pub(crate) fn table_checksum(location: &dyn Location) -> Result<u32> {
    let mut input = location.open_read(DbFile::Table)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = input
            .read(&mut buf)
            .map_err(|err| ArborError::stream(StreamKind::Table, err))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize())
}

impl std::fmt::Debug for DiskData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskData")
            .field("location", &self.location.describe())
            .field("meta", &self.info.meta)
            .finish()
    }
}
