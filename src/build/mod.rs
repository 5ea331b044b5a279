#![forbid(unsafe_code)]

//! Turning parser events into a finished node table.
//!
//! A [`Parser`] pushes events in document order into a [`Builder`], which
//! assigns ids, resolves names and namespaces, and feeds the record encoder
//! and the size ledger. [`DiskBuilder`] owns one such session end to end.

use smallvec::SmallVec;
use tracing::debug;

use crate::storage::{
    HeapKind, HeapStats, Names, Namespaces, RecordEncoder, SizeLedger, SourceInfo, TextKind,
};
use crate::types::{ArborError, NodeId, NodeKind, Result};

mod csv;
mod disk;
mod events;

pub use self::csv::{encode_name, CsvOptions, CsvParser};
pub use disk::DiskBuilder;
pub use events::{Event, EventParser};

/// Attributes of one element: qualified name and raw value.
pub type Atts = SmallVec<[(String, Vec<u8>); 4]>;

/// Namespace declarations of one element: prefix (empty for the default
/// namespace) and uri.
pub type NsDecls = SmallVec<[(String, String); 2]>;

/// Source of node events.
pub trait Parser {
    /// Name and size of the input.
    fn info(&self) -> SourceInfo;

    /// Pushes every event of the input into `builder`, in document order.
    fn parse(&mut self, builder: &mut Builder) -> Result<()>;

    /// Releases the input. Called once when the session closes.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: Parser + ?Sized> Parser for Box<P> {
    fn info(&self) -> SourceInfo {
        (**self).info()
    }

    fn parse(&mut self, builder: &mut Builder) -> Result<()> {
        (**self).parse(builder)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[derive(Clone, Copy, Debug)]
struct OpenNode {
    pre: NodeId,
    kind: NodeKind,
}

/// Receives parser events and writes them to the table.
///
/// Only the chain of currently open containers is kept in memory; the size of
/// each container goes to the ledger the moment it closes.
pub struct Builder {
    encoder: RecordEncoder,
    ledger: SizeLedger,
    elem_names: Names,
    attr_names: Names,
    namespaces: Namespaces,
    open: Vec<OpenNode>,
    chop: bool,
}

/// Everything a completed append phase hands to the patch pass and the
/// finished table.
#[derive(Debug)]
pub struct BuiltTree {
    /// Rows written to the table.
    pub node_count: u32,
    /// Entries written to the ledger.
    pub ledger_entries: u64,
    /// Bytes in the text heap.
    pub text_bytes: u64,
    /// Bytes in the value heap.
    pub value_bytes: u64,
    /// Value storage counters.
    pub heap: HeapStats,
    /// Element names.
    pub elem_names: Names,
    /// Attribute names.
    pub attr_names: Names,
    /// Namespace uris and bindings.
    pub namespaces: Namespaces,
}

impl Builder {
    /// Creates a builder writing through `encoder` and `ledger`.
    pub fn new(encoder: RecordEncoder, ledger: SizeLedger, chop: bool) -> Self {
        Self {
            encoder,
            ledger,
            elem_names: Names::new(),
            attr_names: Names::new(),
            namespaces: Namespaces::new(),
            open: Vec::new(),
            chop,
        }
    }

    /// Rows written so far.
    pub fn node_count(&self) -> u32 {
        self.encoder.node_count()
    }

    /// Element names indexed so far.
    pub fn elem_names(&self) -> &Names {
        &self.elem_names
    }

    /// Attribute names indexed so far.
    pub fn attr_names(&self) -> &Names {
        &self.attr_names
    }

    /// Opens a document node named `name`.
    pub fn open_doc(&mut self, name: &[u8]) -> Result<NodeId> {
        if let Some(parent) = self.open.last() {
            return Err(ArborError::Parse(format!(
                "document opened inside {} {}",
                parent.kind, parent.pre
            )));
        }
        let pre = self.encoder.add_document(name)?;
        self.open.push(OpenNode {
            pre,
            kind: NodeKind::Document,
        });
        debug!(pre = pre.0, "build.doc.open");
        Ok(pre)
    }

    /// Closes the current document node.
    pub fn close_doc(&mut self) -> Result<()> {
        self.close_node(NodeKind::Document)
    }

    /// Opens an element with its attributes and namespace declarations.
    pub fn open_elem(
        &mut self,
        name: &str,
        atts: &[(String, Vec<u8>)],
        nsp: &[(String, String)],
    ) -> Result<NodeId> {
        if name.is_empty() {
            return Err(ArborError::Parse("element without a name".into()));
        }
        for (i, (att, _)) in atts.iter().enumerate() {
            if atts[..i].iter().any(|(prev, _)| prev == att) {
                return Err(ArborError::Parse(format!(
                    "duplicate attribute '{att}' on '{name}'"
                )));
            }
        }

        let pre = NodeId(self.encoder.node_count());
        let dist = self.dist(pre);
        let ns = self
            .namespaces
            .open_scope(pre, nsp.iter().map(|(p, u)| (p.as_str(), u.as_str())))?;
        let uri = self.namespaces.resolve(name, false)?;
        let name_id = self.elem_names.index(name)?;
        let count = u32::try_from(atts.len()).unwrap_or(u32::MAX);
        self.encoder.add_element(dist, name_id, count, uri, ns)?;

        for (i, (att, value)) in atts.iter().enumerate() {
            let uri = self.namespaces.resolve(att, true)?;
            let att_id = self.attr_names.index(att)?;
            let dist = u32::try_from(i + 1).unwrap_or(u32::MAX);
            self.encoder.add_attribute(att_id, value, dist, uri)?;
        }

        self.open.push(OpenNode {
            pre,
            kind: NodeKind::Element,
        });
        Ok(pre)
    }

    /// Adds an element that has no children.
    pub fn empty_elem(
        &mut self,
        name: &str,
        atts: &[(String, Vec<u8>)],
        nsp: &[(String, String)],
    ) -> Result<NodeId> {
        let pre = self.open_elem(name, atts, nsp)?;
        self.close_elem()?;
        Ok(pre)
    }

    /// Closes the innermost open element.
    pub fn close_elem(&mut self) -> Result<()> {
        self.close_node(NodeKind::Element)
    }

    /// Adds a text node; with chopping on, whitespace-only text is dropped.
    pub fn text(&mut self, value: &[u8]) -> Result<Option<NodeId>> {
        if value.is_empty() || (self.chop && value.iter().all(u8::is_ascii_whitespace)) {
            return Ok(None);
        }
        self.leaf(value, TextKind::Text).map(Some)
    }

    /// Adds a comment.
    pub fn comment(&mut self, value: &[u8]) -> Result<NodeId> {
        self.leaf(value, TextKind::Comment)
    }

    /// Adds a processing instruction; its content is the target, a space and
    /// the data (the space is omitted when there is no data).
    pub fn pi(&mut self, target: &str, data: &[u8]) -> Result<NodeId> {
        if target.is_empty() {
            return Err(ArborError::Parse("processing instruction without a target".into()));
        }
        let mut value = Vec::with_capacity(target.len() + 1 + data.len());
        value.extend_from_slice(target.as_bytes());
        if !data.is_empty() {
            value.push(b' ');
            value.extend_from_slice(data);
        }
        self.leaf(&value, TextKind::ProcessingInstruction)
    }

    /// Checks that every container was closed.
    pub fn finish(&self) -> Result<()> {
        match self.open.last() {
            None => Ok(()),
            Some(top) => Err(ArborError::Parse(format!(
                "{} node(s) left open at end of input, innermost {} {}",
                self.open.len(),
                top.kind,
                top.pre
            ))),
        }
    }

    /// Closes the table, heap and ledger streams, recording every failure.
    pub fn close_streams(&mut self, failures: &mut Vec<ArborError>) {
        self.encoder.close(failures);
        if let Err(err) = self.ledger.close() {
            failures.push(err);
        }
    }

    /// Hands over counters and dictionaries after the append phase.
    pub fn into_tree(self) -> BuiltTree {
        BuiltTree {
            node_count: self.encoder.node_count(),
            ledger_entries: self.ledger.entries(),
            text_bytes: self.encoder.heap_size(HeapKind::Text),
            value_bytes: self.encoder.heap_size(HeapKind::Values),
            heap: self.encoder.heap_stats(),
            elem_names: self.elem_names,
            attr_names: self.attr_names,
            namespaces: self.namespaces,
        }
    }

    fn leaf(&mut self, value: &[u8], kind: TextKind) -> Result<NodeId> {
        let dist = self.dist(NodeId(self.encoder.node_count()));
        self.encoder.add_text(value, dist, kind)
    }

    fn dist(&self, pre: NodeId) -> u32 {
        self.open.last().map_or(0, |parent| pre.0 - parent.pre.0)
    }

    fn close_node(&mut self, kind: NodeKind) -> Result<()> {
        let top = match self.open.last() {
            Some(top) if top.kind == kind => *top,
            Some(top) => {
                return Err(ArborError::Parse(format!(
                    "cannot close {kind}: innermost open node is {} {}",
                    top.kind, top.pre
                )))
            }
            None => return Err(ArborError::Parse(format!("cannot close {kind}: nothing is open"))),
        };
        self.open.pop();
        let size = self.encoder.node_count() - top.pre.0 - 1;
        self.ledger.record_size(top.pre, size)?;
        if kind == NodeKind::Element {
            self.namespaces.close_scope();
        }
        Ok(())
    }
}
