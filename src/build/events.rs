use tracing::debug;

use crate::storage::SourceInfo;
use crate::types::{ArborError, Result};

use super::{Atts, Builder, NsDecls, Parser};

/// One parser event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Opens a document node.
    OpenDoc(Vec<u8>),
    /// Closes the current document node.
    CloseDoc,
    /// Opens an element.
    OpenElem {
        /// Qualified name.
        name: String,
        /// Attributes in document order.
        atts: Atts,
        /// Namespace declarations.
        nsp: NsDecls,
    },
    /// Element without children.
    EmptyElem {
        /// Qualified name.
        name: String,
        /// Attributes in document order.
        atts: Atts,
        /// Namespace declarations.
        nsp: NsDecls,
    },
    /// Closes the innermost element.
    CloseElem,
    /// Text content.
    Text(Vec<u8>),
    /// Comment.
    Comment(Vec<u8>),
    /// Processing instruction.
    Pi {
        /// Target.
        target: String,
        /// Data.
        data: Vec<u8>,
    },
}

impl Event {
    /// Opens `name` without attributes or declarations.
    pub fn open(name: impl Into<String>) -> Self {
        Event::OpenElem {
            name: name.into(),
            atts: Atts::new(),
            nsp: NsDecls::new(),
        }
    }

    /// Opens `name` with attributes.
    pub fn open_with<N, V>(name: impl Into<String>, atts: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<Vec<u8>>,
    {
        Event::OpenElem {
            name: name.into(),
            atts: atts.into_iter().map(|(n, v)| (n.into(), v.into())).collect(),
            nsp: NsDecls::new(),
        }
    }

    /// Childless `name` without attributes.
    pub fn empty(name: impl Into<String>) -> Self {
        Event::EmptyElem {
            name: name.into(),
            atts: Atts::new(),
            nsp: NsDecls::new(),
        }
    }

    /// Text content.
    pub fn text(value: impl Into<Vec<u8>>) -> Self {
        Event::Text(value.into())
    }

    /// Rough number of input bytes this event stands for.
    fn weight(&self) -> u64 {
        let len = match self {
            Event::OpenDoc(name) => name.len(),
            Event::CloseDoc | Event::CloseElem => 0,
            Event::OpenElem { name, atts, nsp } | Event::EmptyElem { name, atts, nsp } => {
                name.len()
                    + atts.iter().map(|(n, v)| n.len() + v.len()).sum::<usize>()
                    + nsp.iter().map(|(p, u)| p.len() + u.len()).sum::<usize>()
            }
            Event::Text(value) | Event::Comment(value) => value.len(),
            Event::Pi { target, data } => target.len() + data.len(),
        };
        len as u64
    }

    fn apply(&self, builder: &mut Builder) -> Result<()> {
        match self {
            Event::OpenDoc(name) => builder.open_doc(name).map(drop),
            Event::CloseDoc => builder.close_doc(),
            Event::OpenElem { name, atts, nsp } => builder.open_elem(name, atts, nsp).map(drop),
            Event::EmptyElem { name, atts, nsp } => builder.empty_elem(name, atts, nsp).map(drop),
            Event::CloseElem => builder.close_elem(),
            Event::Text(value) => builder.text(value).map(drop),
            Event::Comment(value) => builder.comment(value).map(drop),
            Event::Pi { target, data } => builder.pi(target, data).map(drop),
        }
    }
}

/// Parser replaying a prepared list of events.
#[derive(Clone, Debug)]
pub struct EventParser {
    events: Vec<Event>,
    source: Option<String>,
    closed: bool,
}

impl EventParser {
    /// Replays `events` in order.
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: events.into_iter().collect(),
            source: None,
            closed: false,
        }
    }

    /// Labels the input for the metadata.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns true once the session released the parser.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Parser for EventParser {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            source: self.source.clone(),
            filesize: self.events.iter().map(Event::weight).sum(),
        }
    }

    fn parse(&mut self, builder: &mut Builder) -> Result<()> {
        if self.closed {
            return Err(ArborError::Closed);
        }
        for event in &self.events {
            event.apply(builder)?;
        }
        debug!(events = self.events.len(), "parser.events.done");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
