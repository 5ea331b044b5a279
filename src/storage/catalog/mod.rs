#![forbid(unsafe_code)]

//! Name and namespace dictionaries populated during a build.
//!
//! Both are owned by the build session and handed to the finished table; they
//! are persisted in the info file next to the metadata.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::trace;

use crate::storage::record::MAX_NAME_ID;
use crate::types::{ArborError, NameId, NodeId, Result, UriId};

/// Uri bound to the `xml` prefix in every scope.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";

const XML_PREFIX: &str = "xml";

/// Bijective mapping between qualified names and compact ids.
///
/// Ids are handed out in first-seen order starting at 1; 0 stays reserved for
/// nodes without a name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NamesRepr", into = "NamesRepr")]
pub struct Names {
    ids: FxHashMap<String, NameId>,
    names: Vec<String>,
    counts: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
struct NamesRepr {
    names: Vec<String>,
    counts: Vec<u64>,
}

impl TryFrom<NamesRepr> for Names {
    type Error = ArborError;

    fn try_from(repr: NamesRepr) -> Result<Self> {
        if repr.names.len() > usize::from(MAX_NAME_ID) {
            return Err(ArborError::Corruption("name dictionary exceeds 15-bit ids"));
        }
        if repr.counts.len() != repr.names.len() {
            return Err(ArborError::Corruption("name counts do not match the names"));
        }
        let mut ids = FxHashMap::default();
        for (id, name) in (1..=MAX_NAME_ID).zip(&repr.names) {
            if ids.insert(name.clone(), NameId(id)).is_some() {
                return Err(ArborError::Corruption("duplicate entry in name dictionary"));
            }
        }
        Ok(Names {
            ids,
            names: repr.names,
            counts: repr.counts,
        })
    }
}

impl From<Names> for NamesRepr {
    fn from(names: Names) -> Self {
        NamesRepr {
            names: names.names,
            counts: names.counts,
        }
    }
}

impl Names {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `name`, allocating the next one on first sight.
    pub fn index(&mut self, name: &str) -> Result<NameId> {
        if let Some(&id) = self.ids.get(name) {
            self.counts[usize::from(id.0) - 1] += 1;
            trace!(name, id = id.0, "names.index.hit");
            return Ok(id);
        }
        if self.names.len() >= usize::from(MAX_NAME_ID) {
            return Err(ArborError::Invalid("name dictionary exceeds 15-bit ids"));
        }
        self.names.push(name.to_owned());
        self.counts.push(1);
        let id = NameId(self.names.len() as u16);
        self.ids.insert(name.to_owned(), id);
        trace!(name, id = id.0, "names.index.miss");
        Ok(id)
    }

    /// Id of a known name.
    pub fn id(&self, name: &str) -> Option<NameId> {
        self.ids.get(name).copied()
    }

    /// Name behind `id`.
    pub fn name(&self, id: NameId) -> Option<&str> {
        let idx = usize::from(id.0).checked_sub(1)?;
        self.names.get(idx).map(String::as_str)
    }

    /// How often `id` was indexed.
    pub fn count(&self, id: NameId) -> u64 {
        usize::from(id.0)
            .checked_sub(1)
            .and_then(|idx| self.counts.get(idx))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no name was indexed.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names with their ids in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NameId, &str)> {
        (1..=MAX_NAME_ID)
            .zip(&self.names)
            .map(|(id, name)| (NameId(id), name.as_str()))
    }
}

/// A namespace declaration recorded on the element that made it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsBinding {
    /// Declaring element.
    pub pre: u32,
    /// Declared prefix; empty for the default namespace.
    pub prefix: String,
    /// Bound uri; 0 undeclares the default namespace.
    pub uri: UriId,
}

type Scope = SmallVec<[(String, UriId); 2]>;

/// Namespace uris, recorded bindings and the scopes of open elements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NamespacesRepr", into = "NamespacesRepr")]
pub struct Namespaces {
    uris: Vec<String>,
    uri_ids: FxHashMap<String, UriId>,
    bindings: Vec<NsBinding>,
    scopes: Vec<Scope>,
}

#[derive(Serialize, Deserialize)]
struct NamespacesRepr {
    uris: Vec<String>,
    bindings: Vec<NsBinding>,
}

impl TryFrom<NamespacesRepr> for Namespaces {
    type Error = ArborError;

    fn try_from(repr: NamespacesRepr) -> Result<Self> {
        if repr.uris.len() > usize::from(u8::MAX) {
            return Err(ArborError::Corruption("namespace dictionary exceeds 8-bit ids"));
        }
        if repr.uris.first().map(String::as_str) != Some(XML_URI) {
            return Err(ArborError::Corruption("namespace dictionary lacks the xml uri"));
        }
        let mut uri_ids = FxHashMap::default();
        for (id, uri) in (1..=u8::MAX).zip(&repr.uris) {
            if uri_ids.insert(uri.clone(), UriId(id)).is_some() {
                return Err(ArborError::Corruption("duplicate entry in namespace dictionary"));
            }
        }
        if repr
            .bindings
            .iter()
            .any(|b| usize::from(b.uri.0) > repr.uris.len())
        {
            return Err(ArborError::Corruption("namespace binding to an unknown uri"));
        }
        Ok(Namespaces {
            uris: repr.uris,
            uri_ids,
            bindings: repr.bindings,
            scopes: Vec::new(),
        })
    }
}

impl From<Namespaces> for NamespacesRepr {
    fn from(ns: Namespaces) -> Self {
        NamespacesRepr {
            uris: ns.uris,
            bindings: ns.bindings,
        }
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespaces {
    /// Creates the dictionary with the `xml` uri predeclared.
    pub fn new() -> Self {
        let mut ns = Namespaces {
            uris: Vec::new(),
            uri_ids: FxHashMap::default(),
            bindings: Vec::new(),
            scopes: Vec::new(),
        };
        ns.uris.push(XML_URI.to_owned());
        ns.uri_ids.insert(XML_URI.to_owned(), UriId(1));
        ns
    }

    /// Opens the scope of the element stored at `pre`.
    ///
    /// Returns true if the element declares at least one namespace.
    pub fn open_scope<'a, I>(&mut self, pre: NodeId, decls: I) -> Result<bool>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut scope = Scope::new();
        for (prefix, uri) in decls {
            if prefix == XML_PREFIX {
                return Err(ArborError::Parse("the xml prefix cannot be redeclared".into()));
            }
            if uri.is_empty() && !prefix.is_empty() {
                return Err(ArborError::Parse(format!(
                    "prefix '{prefix}' bound to an empty uri"
                )));
            }
            let id = if uri.is_empty() {
                UriId(0)
            } else {
                self.intern(uri)?
            };
            self.bindings.push(NsBinding {
                pre: pre.0,
                prefix: prefix.to_owned(),
                uri: id,
            });
            scope.push((prefix.to_owned(), id));
        }
        let declared = !scope.is_empty();
        self.scopes.push(scope);
        Ok(declared)
    }

    /// Closes the innermost open scope.
    pub fn close_scope(&mut self) {
        self.scopes.pop();
    }

    /// Resolves the namespace of a qualified element or attribute name.
    ///
    /// Unprefixed attributes are never in a namespace; unprefixed elements
    /// take the innermost default namespace.
    pub fn resolve(&self, qname: &str, attribute: bool) -> Result<UriId> {
        let prefix = match qname.split_once(':') {
            Some((prefix, _)) => prefix,
            None if attribute => return Ok(UriId(0)),
            None => "",
        };
        if prefix == XML_PREFIX {
            return Ok(UriId(1));
        }
        for scope in self.scopes.iter().rev() {
            if let Some((_, id)) = scope.iter().rev().find(|(p, _)| p == prefix) {
                return Ok(*id);
            }
        }
        if prefix.is_empty() {
            return Ok(UriId(0));
        }
        Err(ArborError::Parse(format!(
            "undeclared namespace prefix '{prefix}' in '{qname}'"
        )))
    }

    /// Uri behind `id`.
    pub fn uri(&self, id: UriId) -> Option<&str> {
        let idx = usize::from(id.0).checked_sub(1)?;
        self.uris.get(idx).map(String::as_str)
    }

    /// Id of a known uri.
    pub fn uri_id(&self, uri: &str) -> Option<UriId> {
        self.uri_ids.get(uri).copied()
    }

    /// Number of distinct uris, `xml` included.
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Always false; the `xml` uri is predeclared.
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Declarations in document order.
    pub fn bindings(&self) -> &[NsBinding] {
        &self.bindings
    }

    fn intern(&mut self, uri: &str) -> Result<UriId> {
        if let Some(&id) = self.uri_ids.get(uri) {
            return Ok(id);
        }
        if self.uris.len() >= usize::from(u8::MAX) {
            return Err(ArborError::Invalid("namespace dictionary exceeds 8-bit ids"));
        }
        self.uris.push(uri.to_owned());
        let id = UriId(self.uris.len() as u8);
        self.uri_ids.insert(uri.to_owned(), id);
        trace!(uri, id = id.0, "namespaces.intern");
        Ok(id)
    }
}
