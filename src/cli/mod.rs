#![forbid(unsafe_code)]

//! Command implementations behind the `arbor` binary.
//!
//! The binary only parses flags and prints; everything that touches a
//! database lives here so it can be driven from tests.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::info;

use crate::build::{CsvOptions, CsvParser, DiskBuilder};
use crate::data::DiskData;
use crate::primitives::io::{DirLocation, Location};
use crate::storage::{BuildOptions, HeapStats, MetaData};
use crate::types::{ArborError, NodeId, NodeKind};

/// CLI config file handling.
pub mod config;

pub use config::{CliConfig, ConfigError};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// Storage failure.
    #[error(transparent)]
    Arbor(#[from] ArborError),
    /// Config file failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        CliError::Message(value.to_string())
    }
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        CliError::Message(value)
    }
}

/// Inputs of `arbor create`.
#[derive(Clone, Debug)]
pub struct CreateConfig {
    /// Database directory; replaced if it exists.
    pub db_path: PathBuf,
    /// CSV input.
    pub csv_path: PathBuf,
    /// Database name; defaults to the directory name.
    pub name: Option<String>,
    /// Build options.
    pub build: BuildOptions,
    /// CSV mapping options.
    pub csv: CsvOptions,
}

/// Outcome of `arbor create`.
#[derive(Clone, Debug)]
pub struct CreateSummary {
    /// Database name.
    pub name: String,
    /// Rows written.
    pub nodes: u32,
    /// Text heap bytes.
    pub text_bytes: u64,
    /// Value heap bytes.
    pub value_bytes: u64,
    /// Value storage counters.
    pub heap: HeapStats,
    /// Wall time of the build.
    pub elapsed: Duration,
}

impl fmt::Display for CreateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "created '{}': {} nodes in {:.2?}",
            self.name, self.nodes, self.elapsed
        )?;
        writeln!(
            f,
            "heaps: text {} bytes, values {} bytes",
            self.text_bytes, self.value_bytes
        )?;
        write!(
            f,
            "values: {} inline, {} raw, {} compressed ({} bytes saved)",
            self.heap.inline_values,
            self.heap.raw_values,
            self.heap.compressed_values,
            self.heap.bytes_saved
        )
    }
}

/// Builds a database from a CSV file.
pub fn run_create(cfg: &CreateConfig) -> Result<CreateSummary, CliError> {
    let name = match &cfg.name {
        Some(name) => name.clone(),
        None => cfg
            .db_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CliError::Message(format!(
                    "cannot derive a database name from {}; pass --name",
                    cfg.db_path.display()
                ))
            })?,
    };
    let parser = CsvParser::open(&cfg.csv_path, cfg.csv.clone()).map_err(|err| {
        CliError::Message(format!("cannot open {}: {err}", cfg.csv_path.display()))
    })?;
    let location: Arc<dyn Location> = Arc::new(DirLocation::new(&cfg.db_path));
    let started = Instant::now();
    let mut session = DiskBuilder::new(name.clone(), location, parser, cfg.build.clone());
    let data = session.build()?;
    let meta = data.meta();
    info!(name = %name, nodes = meta.size, "cli.create.done");
    Ok(CreateSummary {
        name,
        nodes: meta.size,
        text_bytes: meta.text_bytes,
        value_bytes: meta.value_bytes,
        heap: meta.heap,
        elapsed: started.elapsed(),
    })
}

/// Inputs of `arbor inspect`.
#[derive(Clone, Debug)]
pub struct InspectConfig {
    /// Database directory.
    pub db_path: PathBuf,
    /// Rows to dump from the start of the table.
    pub nodes: u32,
    /// Whether to run the checksum and structure check.
    pub verify: bool,
}

/// One dumped row.
#[derive(Clone, Debug)]
pub struct NodeLine {
    /// Row.
    pub pre: u32,
    /// Node kind.
    pub kind: NodeKind,
    /// Raw record as hex.
    pub hex: String,
    /// Name of elements and attributes.
    pub name: Option<String>,
    /// Subtree size.
    pub size: u32,
    /// Content, lossily decoded and shortened.
    pub value: Option<String>,
}

/// Outcome of `arbor inspect`.
#[derive(Clone, Debug)]
pub struct InspectReport {
    /// Database metadata.
    pub meta: MetaData,
    /// Dumped rows.
    pub nodes: Vec<NodeLine>,
    /// Whether verification ran and passed.
    pub verified: bool,
}

const VALUE_PREVIEW: usize = 40;

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = &self.meta;
        writeln!(f, "database: {}", meta.name)?;
        if let Some(source) = &meta.source {
            writeln!(f, "source: {source} ({} bytes)", meta.filesize)?;
        }
        writeln!(f, "nodes: {}", meta.size)?;
        writeln!(
            f,
            "heaps: text {} bytes, values {} bytes",
            meta.text_bytes, meta.value_bytes
        )?;
        writeln!(f, "table crc32: {:08x}", meta.table_crc32)?;
        for node in &self.nodes {
            write!(
                f,
                "{:>8}  {}  {:<22} size={}",
                node.pre, node.hex, node.kind, node.size
            )?;
            if let Some(name) = &node.name {
                write!(f, " name={name}")?;
            }
            if let Some(value) = &node.value {
                write!(f, " value={value:?}")?;
            }
            writeln!(f)?;
        }
        if self.verified {
            writeln!(f, "verify: ok")?;
        }
        Ok(())
    }
}

/// Dumps metadata and the first rows of a database.
pub fn run_inspect(cfg: &InspectConfig) -> Result<InspectReport, CliError> {
    let location: Arc<dyn Location> = Arc::new(DirLocation::new(&cfg.db_path));
    let data = match DiskData::open(location) {
        Ok(data) => data,
        Err(ArborError::NotFound) => {
            return Err(CliError::Message(format!(
                "no database at {}",
                cfg.db_path.display()
            )))
        }
        Err(err) => return Err(err.into()),
    };
    let mut nodes = Vec::new();
    for row in 0..cfg.nodes.min(data.size()) {
        let pre = NodeId(row);
        let raw = data.raw(pre)?;
        let record = data.record(pre)?;
        let value = data.value(pre)?.map(|bytes| preview(&bytes));
        nodes.push(NodeLine {
            pre: row,
            kind: record.kind(),
            hex: hex::encode(raw),
            name: data.name(pre)?.map(str::to_owned),
            size: record.size(),
            value,
        });
    }
    if cfg.verify {
        data.verify()?;
    }
    Ok(InspectReport {
        meta: data.meta().clone(),
        nodes,
        verified: cfg.verify,
    })
}

fn preview(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() <= VALUE_PREVIEW {
        return text.into_owned();
    }
    let mut short: String = text.chars().take(VALUE_PREVIEW).collect();
    short.push_str("...");
    short
}
