#![forbid(unsafe_code)]

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::primitives::io::{DbFile, Location};
use crate::types::{ArborError, Result};

use super::catalog::{Names, Namespaces};
use super::compress::CodecKind;
use super::heap::HeapStats;
use super::options::BuildOptions;

/// Layout version written into every info file.
pub const FORMAT_VERSION: u32 = 1;

/// What a parser knows about its input before parsing starts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// Path or label of the input.
    pub source: Option<String>,
    /// Input size estimate in bytes.
    pub filesize: u64,
}

/// Properties of one database generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    /// Layout version.
    pub format_version: u32,
    /// Database name.
    pub name: String,
    /// Input the database was built from.
    pub source: Option<String>,
    /// Input size estimate.
    pub filesize: u64,
    /// Number of table rows.
    pub size: u32,
    /// Set while a build is running; a finished database is never dirty.
    pub dirty: bool,
    /// Whether whitespace-only text was dropped.
    pub chop: bool,
    /// Whether integer values were stored inline.
    pub inline_numbers: bool,
    /// Codec used for heap entries.
    pub codec: CodecKind,
    /// Bytes in the text heap.
    pub text_bytes: u64,
    /// Bytes in the value heap.
    pub value_bytes: u64,
    /// Value storage counters.
    pub heap: HeapStats,
    /// CRC32 of the patched table.
    pub table_crc32: u32,
}

impl MetaData {
    /// Fresh metadata for database `name` built with `opts`.
    pub fn new(name: impl Into<String>, opts: &BuildOptions) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            name: name.into(),
            source: None,
            filesize: 0,
            size: 0,
            dirty: false,
            chop: opts.chop,
            inline_numbers: opts.inline_numbers,
            codec: opts.codec,
            text_bytes: 0,
            value_bytes: 0,
            heap: HeapStats::default(),
            table_crc32: 0,
        }
    }

    /// Takes over the properties reported by the parser.
    pub fn assign(&mut self, info: &SourceInfo) {
        self.source = info.source.clone();
        self.filesize = info.filesize;
    }
}

/// Contents of the info file: metadata plus the dictionaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInfo {
    /// Database properties.
    pub meta: MetaData,
    /// Element names.
    pub elem_names: Names,
    /// Attribute names.
    pub attr_names: Names,
    /// Namespace uris and bindings.
    pub namespaces: Namespaces,
}

impl DbInfo {
    /// Info for a build that has not produced any node yet.
    pub fn pending(meta: MetaData) -> Self {
        Self {
            meta,
            elem_names: Names::new(),
            attr_names: Names::new(),
            namespaces: Namespaces::new(),
        }
    }

    /// Writes the info file, replacing any previous one.
    pub fn write(&self, location: &dyn Location) -> Result<()> {
        let mut out = location.create(DbFile::Info)?;
        serde_json::to_writer_pretty(&mut out, self)
            .map_err(|err| ArborError::Io(io::Error::from(err)))?;
        out.flush()?;
        debug!(
            name = %self.meta.name,
            dirty = self.meta.dirty,
            nodes = self.meta.size,
            "meta.write"
        );
        Ok(())
    }

    /// Reads the info file; a missing file is [`ArborError::NotFound`].
    pub fn read(location: &dyn Location) -> Result<Self> {
        if !location.exists(DbFile::Info) {
            return Err(ArborError::NotFound);
        }
        let mut raw = Vec::new();
        location.open_read(DbFile::Info)?.read_to_end(&mut raw)?;
        let info: DbInfo = serde_json::from_slice(&raw)
            .map_err(|_| ArborError::Corruption("info file is not valid metadata"))?;
        if info.meta.format_version != FORMAT_VERSION {
            return Err(ArborError::Corruption("unsupported format version"));
        }
        Ok(info)
    }
}
