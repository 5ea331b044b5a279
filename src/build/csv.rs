//! CSV front end.
//!
//! A file becomes one document holding `<csv>`, one `<record>` per row and one
//! element per field. With a header row, fields are named after their column
//! (encoded as element names), or keep the name `entry` and carry the column
//! in a `name` attribute in attributes mode.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use smallvec::smallvec;
use tracing::{debug, trace};

use crate::storage::SourceInfo;
use crate::types::{ArborError, Result};

use super::{Atts, Builder, Parser};

const CSV: &str = "csv";
const RECORD: &str = "record";
const ENTRY: &str = "entry";
const NAME: &str = "name";

/// How CSV input is read and mapped to nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvOptions {
    /// First row names the columns.
    pub header: bool,
    /// Column names go into a `name` attribute instead of the element name.
    pub attributes: bool,
    /// Field delimiter.
    pub delimiter: u8,
    /// Invalid name characters become `_` instead of an escape sequence.
    pub lax: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            header: false,
            attributes: false,
            delimiter: b',',
            lax: true,
        }
    }
}

/// Parser reading CSV from any byte source.
pub struct CsvParser<R> {
    reader: Option<R>,
    doc: String,
    info: SourceInfo,
    opts: CsvOptions,
}

impl CsvParser<File> {
    /// Opens the CSV file at `path`; the document is named after the file.
    pub fn open(path: impl AsRef<Path>, opts: CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let filesize = file.metadata()?.len();
        let doc = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            reader: Some(file),
            doc,
            info: SourceInfo {
                source: Some(path.display().to_string()),
                filesize,
            },
            opts,
        })
    }
}

impl<R: Read> CsvParser<R> {
    /// Reads CSV from `reader` into a document named `doc`.
    pub fn from_reader(reader: R, doc: impl Into<String>, filesize: u64, opts: CsvOptions) -> Self {
        let doc = doc.into();
        Self {
            reader: Some(reader),
            info: SourceInfo {
                source: Some(doc.clone()),
                filesize,
            },
            doc,
            opts,
        }
    }
}

impl<R: Read> Parser for CsvParser<R> {
    fn info(&self) -> SourceInfo {
        self.info.clone()
    }

    fn parse(&mut self, builder: &mut Builder) -> Result<()> {
        let reader = self.reader.take().ok_or(ArborError::Closed)?;
        let mut input = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.opts.delimiter)
            .from_reader(reader);

        builder.open_doc(self.doc.as_bytes())?;
        builder.open_elem(CSV, &[], &[])?;

        let mut headers: Vec<String> = Vec::new();
        let mut record = csv::ByteRecord::new();
        let mut first = true;
        let mut rows = 0u64;
        while input.read_byte_record(&mut record).map_err(csv_error)? {
            if first && self.opts.header {
                first = false;
                headers = record
                    .iter()
                    .map(|field| {
                        let raw = String::from_utf8_lossy(field);
                        if self.opts.attributes {
                            raw.into_owned()
                        } else {
                            encode_name(&raw, self.opts.lax)
                        }
                    })
                    .collect();
                trace!(columns = headers.len(), "csv.header");
                continue;
            }
            first = false;
            builder.open_elem(RECORD, &[], &[])?;
            for (col, field) in record.iter().enumerate() {
                match (headers.get(col), self.opts.attributes) {
                    (Some(header), true) => {
                        let atts: Atts = smallvec![(NAME.to_string(), header.as_bytes().to_vec())];
                        builder.open_elem(ENTRY, &atts, &[])?;
                    }
                    (Some(header), false) => {
                        builder.open_elem(header, &[], &[])?;
                    }
                    (None, _) => {
                        builder.open_elem(ENTRY, &[], &[])?;
                    }
                }
                builder.text(field)?;
                builder.close_elem()?;
            }
            builder.close_elem()?;
            rows += 1;
        }

        builder.close_elem()?;
        builder.close_doc()?;
        debug!(rows, doc = %self.doc, "csv.parse.done");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

fn csv_error(err: csv::Error) -> ArborError {
    let line = err.position().map(|pos| pos.line());
    match line {
        Some(line) => ArborError::Parse(format!("csv line {line}: {err}")),
        None => ArborError::Parse(format!("csv: {err}")),
    }
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_numeric() || c == '-' || c == '.'
}

/// Turns arbitrary text into a valid unprefixed element name.
///
/// In lax mode every invalid character becomes `_`. Otherwise `_` is doubled
/// and invalid characters are written as `_` plus four hex digits, so the
/// original can be recovered.
pub fn encode_name(raw: &str, lax: bool) -> String {
    if raw.is_empty() {
        return "_".to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        let valid = if i == 0 { is_name_start(c) } else { is_name_char(c) };
        if lax {
            out.push(if valid { c } else { '_' });
        } else if c == '_' {
            out.push_str("__");
        } else if valid {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut [0u16; 2]) {
                out.push_str(&format!("_{:04x}", unit));
            }
        }
    }
    out
}
