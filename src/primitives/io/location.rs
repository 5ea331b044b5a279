use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::types::{ArborError, Result, StreamKind};

use super::{FileIo, StdFileIo};

/// Well-known files inside a database location.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DbFile {
    /// Fixed-width node table.
    Table,
    /// Text heap.
    Text,
    /// Attribute value heap.
    Values,
    /// Transient size ledger.
    Ledger,
    /// Metadata, dictionaries and namespaces of a finished build.
    Info,
}

impl DbFile {
    /// File name used by [`DirLocation`].
    pub const fn file_name(self) -> &'static str {
        match self {
            DbFile::Table => "tbl.arbor",
            DbFile::Text => "txt.arbor",
            DbFile::Values => "atv.arbor",
            DbFile::Ledger => "tmp.arbor",
            DbFile::Info => "inf.arbor",
        }
    }

    /// Build stream stored in this file, if any.
    pub const fn stream(self) -> Option<StreamKind> {
        match self {
            DbFile::Table => Some(StreamKind::Table),
            DbFile::Text => Some(StreamKind::Text),
            DbFile::Values => Some(StreamKind::Values),
            DbFile::Ledger => Some(StreamKind::Ledger),
            DbFile::Info => None,
        }
    }

    /// Tags an I/O failure on this file with its stream.
    pub fn error(self, err: io::Error) -> ArborError {
        match self.stream() {
            Some(stream) => ArborError::stream(stream, err),
            None => ArborError::Io(err),
        }
    }
}

/// Storage location of one database.
///
/// A build session only ever touches its files through this trait.
pub trait Location: Send + Sync {
    /// Human-readable description used in logs.
    fn describe(&self) -> String;
    /// Creates the location, destroying whatever it held before.
    fn prepare(&self) -> Result<()>;
    /// Creates (or truncates) `file` for sequential appends.
    fn create(&self, file: DbFile) -> Result<Box<dyn Write + Send>>;
    /// Opens `file` for sequential reads.
    fn open_read(&self, file: DbFile) -> Result<Box<dyn Read + Send>>;
    /// Opens an existing `file` for positioned access.
    fn open_random(&self, file: DbFile, writable: bool) -> Result<Box<dyn FileIo>>;
    /// Deletes `file`; missing files are not an error.
    fn remove(&self, file: DbFile) -> Result<()>;
    /// Returns true if `file` exists.
    fn exists(&self, file: DbFile) -> bool;
}

/// [`Location`] backed by a directory on the local file system.
#[derive(Clone, Debug)]
pub struct DirLocation {
    root: PathBuf,
}

impl DirLocation {
    /// Uses `root` as the database directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the database files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of `file`.
    pub fn path(&self, file: DbFile) -> PathBuf {
        self.root.join(file.file_name())
    }
}

impl Location for DirLocation {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn prepare(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|err| {
                ArborError::Resource(format!(
                    "cannot clear {}: {err}",
                    self.root.display()
                ))
            })?;
        }
        fs::create_dir_all(&self.root).map_err(|err| {
            ArborError::Resource(format!("cannot create {}: {err}", self.root.display()))
        })
    }

    fn create(&self, file: DbFile) -> Result<Box<dyn Write + Send>> {
        let handle = File::create(self.path(file)).map_err(|err| file.error(err))?;
        Ok(Box::new(handle))
    }

    fn open_read(&self, file: DbFile) -> Result<Box<dyn Read + Send>> {
        let handle = File::open(self.path(file)).map_err(|err| file.error(err))?;
        Ok(Box::new(BufReader::new(handle)))
    }

    fn open_random(&self, file: DbFile, writable: bool) -> Result<Box<dyn FileIo>> {
        let io = StdFileIo::open_existing(self.path(file), writable)
            .map_err(|err| file.error(err))?;
        Ok(Box::new(io))
    }

    fn remove(&self, file: DbFile) -> Result<()> {
        match fs::remove_file(self.path(file)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(file.error(err)),
        }
    }

    fn exists(&self, file: DbFile) -> bool {
        self.path(file).exists()
    }
}
