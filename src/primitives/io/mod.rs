#![forbid(unsafe_code)]

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::Path,
    sync::Arc,
};

use tracing::trace;

use crate::primitives::bytes::var;
use crate::types::{ArborError, Result, StreamKind};

mod location;

pub use location::{DbFile, DirLocation, Location};

/// Trait for performing positioned file I/O operations.
pub trait FileIo: Send + Sync + 'static {
    /// Reads bytes from the file at the specified offset into the buffer.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes bytes to the file at the specified offset from the buffer.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Synchronizes all file data and metadata to disk.
    fn sync_all(&self) -> Result<()>;
    /// Returns the current length of the file in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns true if the file is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(unix)]
mod stdio_unix {
    use std::{
        fs::File,
        io::{self, ErrorKind},
        os::unix::fs::FileExt,
    };

    /// Reads exact number of bytes at offset using pread semantics.
    pub fn read_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
        while !dst.is_empty() {
            let read = file.read_at(dst, off)?;
            if read == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "read_at reached EOF",
                ));
            }
            let (_, tail) = dst.split_at_mut(read);
            dst = tail;
            off += read as u64;
        }
        Ok(())
    }

    /// Writes all bytes at offset using pwrite semantics.
    pub fn write_all(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
        while !src.is_empty() {
            let written = file.write_at(src, off)?;
            if written == 0 {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "write_at wrote zero bytes",
                ));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }
}

#[cfg(windows)]
mod stdio_win {
    use std::{
        fs::File,
        io::{self, ErrorKind},
        os::windows::fs::FileExt,
    };

    /// Reads exact number of bytes at offset using seek_read semantics.
    pub fn read_exact(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
        while !dst.is_empty() {
            let read = file.seek_read(dst, off)?;
            if read == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "seek_read reached EOF",
                ));
            }
            let (_, tail) = dst.split_at_mut(read);
            dst = tail;
            off += read as u64;
        }
        Ok(())
    }

    /// Writes all bytes at offset using seek_write semantics.
    pub fn write_all(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
        while !src.is_empty() {
            let written = file.seek_write(src, off)?;
            if written == 0 {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "seek_write wrote zero bytes",
                ));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }
}

/// Standard file I/O implementation using `Arc<File>`.
#[derive(Clone)]
pub struct StdFileIo {
    inner: Arc<File>,
}

impl StdFileIo {
    /// Creates a new StdFileIo from an existing File handle.
    pub fn new(file: File) -> Self {
        Self {
            inner: Arc::new(file),
        }
    }

    /// Opens an existing file, for reading only or for in-place updates.
    pub fn open_existing(path: impl AsRef<Path>, writable: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(false)
            .open(path)?;
        Ok(Self::new(file))
    }

    fn file(&self) -> &File {
        &self.inner
    }

    #[cfg(unix)]
    fn read_exact(&self, off: u64, dst: &mut [u8]) -> io::Result<()> {
        stdio_unix::read_exact(self.file(), off, dst)
    }

    #[cfg(windows)]
    fn read_exact(&self, off: u64, dst: &mut [u8]) -> io::Result<()> {
        stdio_win::read_exact(self.file(), off, dst)
    }

    #[cfg(unix)]
    fn write_all(&self, off: u64, src: &[u8]) -> io::Result<()> {
        stdio_unix::write_all(self.file(), off, src)
    }

    #[cfg(windows)]
    fn write_all(&self, off: u64, src: &[u8]) -> io::Result<()> {
        stdio_win::write_all(self.file(), off, src)
    }

    #[cfg(not(any(unix, windows)))]
    fn read_exact(&self, _off: u64, _dst: &mut [u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "StdFileIo unsupported on this platform",
        ))
    }

    #[cfg(not(any(unix, windows)))]
    fn write_all(&self, _off: u64, _src: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "StdFileIo unsupported on this platform",
        ))
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        self.read_exact(off, dst).map_err(ArborError::from)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        self.write_all(off, src).map_err(ArborError::from)
    }

    fn sync_all(&self) -> Result<()> {
        self.file().sync_all().map_err(ArborError::from)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file().metadata().map_err(ArborError::from)?.len())
    }
}

/// Buffered append-only output stream that tracks how many bytes it has written.
///
/// Every failure is tagged with the stream it belongs to. `close` flushes and
/// releases the underlying sink; calling it again is a no-op.
pub struct DataOutput {
    stream: StreamKind,
    inner: Option<BufWriter<Box<dyn Write + Send>>>,
    size: u64,
    scratch: Vec<u8>,
}

impl DataOutput {
    /// Wraps `sink` with a buffer of `buffer` bytes.
    pub fn new(stream: StreamKind, sink: Box<dyn Write + Send>, buffer: usize) -> Self {
        Self {
            stream,
            inner: Some(BufWriter::with_capacity(buffer, sink)),
            size: 0,
            scratch: Vec::new(),
        }
    }

    /// Bytes accepted so far; also the offset of the next write.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns true once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Appends `bytes` in a single buffered write.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream;
        let out = self.inner.as_mut().ok_or(ArborError::Closed)?;
        out.write_all(bytes)
            .map_err(|err| ArborError::stream(stream, err))?;
        self.size += bytes.len() as u64;
        Ok(())
    }

    /// Appends `v` as an unsigned varint.
    pub fn write_num(&mut self, v: u64) -> Result<()> {
        let mut buf = std::mem::take(&mut self.scratch);
        buf.clear();
        var::encode_u64(v, &mut buf);
        let res = self.write(&buf);
        self.scratch = buf;
        res
    }

    /// Flushes buffered bytes and releases the sink.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut out) = self.inner.take() else {
            return Ok(());
        };
        out.flush()
            .map_err(|err| ArborError::stream(self.stream, err))?;
        trace!(stream = %self.stream, bytes = self.size, "io.output.closed");
        Ok(())
    }
}
