#![allow(missing_docs)]

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use arbor::build::{Event, EventParser};
use arbor::primitives::io::{DbFile, DirLocation, FileIo, Location};
use arbor::storage::{BuildOptions, CodecKind};
use arbor::types::StreamKind;
use arbor::{ArborError, DiskBuilder, DiskData, Result};
use tempfile::tempdir;

#[derive(Clone, Copy, Debug, Default)]
struct Faults {
    /// Stream whose writes fail once this many bytes went through.
    write_budget: Option<(DbFile, usize)>,
    /// Streams whose flush always fails.
    flush: &'static [DbFile],
    /// Positioned writes on the table fail.
    patch: bool,
}

struct FaultyLocation {
    inner: DirLocation,
    faults: Faults,
}

struct FaultyWriter {
    inner: Box<dyn Write + Send>,
    budget: Option<usize>,
    fail_flush: bool,
}

impl Write for FaultyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(budget) = self.budget.as_mut() {
            if buf.len() > *budget {
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
            }
            *budget -= buf.len();
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.fail_flush {
            return Err(io::Error::new(io::ErrorKind::Other, "injected flush failure"));
        }
        self.inner.flush()
    }
}

struct FaultyTable {
    inner: Box<dyn FileIo>,
}

impl FileIo for FaultyTable {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        self.inner.read_at(off, dst)
    }

    fn write_at(&self, _off: u64, _src: &[u8]) -> Result<()> {
        Err(ArborError::Io(io::Error::new(
            io::ErrorKind::Other,
            "injected patch failure",
        )))
    }

    fn sync_all(&self) -> Result<()> {
        self.inner.sync_all()
    }

    fn len(&self) -> Result<u64> {
        self.inner.len()
    }
}

impl Location for FaultyLocation {
    fn describe(&self) -> String {
        format!("faulty:{}", self.inner.describe())
    }

    fn prepare(&self) -> Result<()> {
        self.inner.prepare()
    }

    fn create(&self, file: DbFile) -> Result<Box<dyn Write + Send>> {
        let inner = self.inner.create(file)?;
        let budget = match self.faults.write_budget {
            Some((target, budget)) if target == file => Some(budget),
            _ => None,
        };
        Ok(Box::new(FaultyWriter {
            inner,
            budget,
            fail_flush: self.faults.flush.contains(&file),
        }))
    }

    fn open_read(&self, file: DbFile) -> Result<Box<dyn Read + Send>> {
        self.inner.open_read(file)
    }

    fn open_random(&self, file: DbFile, writable: bool) -> Result<Box<dyn FileIo>> {
        let inner = self.inner.open_random(file, writable)?;
        if self.faults.patch && file == DbFile::Table && writable {
            return Ok(Box::new(FaultyTable { inner }));
        }
        Ok(inner)
    }

    fn remove(&self, file: DbFile) -> Result<()> {
        self.inner.remove(file)
    }

    fn exists(&self, file: DbFile) -> bool {
        self.inner.exists(file)
    }
}

fn session(root: &Path, faults: Faults, events: Vec<Event>) -> DiskBuilder<EventParser> {
    let location: Arc<dyn Location> = Arc::new(FaultyLocation {
        inner: DirLocation::new(root.join("db")),
        faults,
    });
    DiskBuilder::new(
        "faulty",
        location,
        EventParser::new(events),
        BuildOptions::default()
            .memory_headroom(1 << 30)
            .codec(CodecKind::None),
    )
}

fn big_texts(count: usize) -> Vec<Event> {
    let mut events = vec![Event::open("root")];
    for i in 0..count {
        events.push(Event::open("chunk"));
        events.push(Event::text(format!("{i:05}").repeat(1_000)));
        events.push(Event::CloseElem);
    }
    events.push(Event::CloseElem);
    events
}

fn reopen(root: &Path) -> Result<DiskData> {
    DiskData::open(Arc::new(DirLocation::new(root.join("db"))))
}

#[test]
fn heap_failure_mid_parse_is_fatal_and_close_stays_quiet() {
    let dir = tempdir().unwrap();
    let faults = Faults {
        write_budget: Some((DbFile::Text, 12_000)),
        ..Faults::default()
    };
    let mut session = session(dir.path(), faults, big_texts(8));
    let err = session.build().unwrap_err();
    assert!(
        matches!(
            err,
            ArborError::Stream {
                stream: StreamKind::Text,
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert!(session.is_closed());
    assert!(session.parser().is_closed());
    session.close().unwrap();
    session.close().unwrap();
    session.abort();
    assert!(matches!(session.build(), Err(ArborError::Closed)));
    assert!(matches!(reopen(dir.path()), Err(ArborError::Corruption(_))));
}

#[test]
fn table_failure_names_the_table_stream() {
    let dir = tempdir().unwrap();
    let faults = Faults {
        write_budget: Some((DbFile::Table, 0)),
        ..Faults::default()
    };
    let mut events = vec![Event::open("root")];
    events.extend((0..600).map(|_| Event::empty("leaf")));
    events.push(Event::CloseElem);
    let mut session = session(dir.path(), faults, events);
    let err = session.build().unwrap_err();
    assert!(matches!(
        err,
        ArborError::Stream {
            stream: StreamKind::Table,
            ..
        }
    ));
    session.close().unwrap();
}

#[test]
fn patch_failure_never_yields_a_table() {
    let dir = tempdir().unwrap();
    let faults = Faults {
        patch: true,
        ..Faults::default()
    };
    let mut session = session(
        dir.path(),
        faults,
        vec![Event::open("root"), Event::empty("a"), Event::CloseElem],
    );
    match session.build().unwrap_err() {
        ArborError::Patch { applied, total, .. } => {
            assert_eq!(applied, 0);
            assert_eq!(total, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    session.close().unwrap();
    assert!(dir.path().join("db").join(DbFile::Ledger.file_name()).exists());
    assert!(matches!(reopen(dir.path()), Err(ArborError::Corruption(_))));
}

#[test]
fn close_failures_are_collected_from_every_stream() {
    let dir = tempdir().unwrap();
    let faults = Faults {
        flush: &[DbFile::Table, DbFile::Values],
        ..Faults::default()
    };
    let mut session = session(dir.path(), faults, vec![Event::empty("root")]);
    match session.build().unwrap_err() {
        ArborError::Close(failures) => {
            assert_eq!(failures.len(), 2);
            let streams: Vec<StreamKind> = failures
                .iter()
                .filter_map(|f| match f {
                    ArborError::Stream { stream, .. } => Some(*stream),
                    _ => None,
                })
                .collect();
            assert_eq!(streams, [StreamKind::Table, StreamKind::Values]);
        }
        other => panic!("unexpected error: {other}"),
    }
    session.close().unwrap();
}

#[test]
fn unusable_location_fails_before_any_stream_opens() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let location: Arc<dyn Location> = Arc::new(DirLocation::new(blocker.join("db")));
    let mut session = DiskBuilder::new(
        "nowhere",
        location,
        EventParser::new(vec![Event::empty("x")]),
        BuildOptions::default().memory_headroom(1 << 30),
    );
    assert!(matches!(session.build(), Err(ArborError::Resource(_))));
    session.close().unwrap();
}

#[test]
fn abort_mid_life_closes_the_parser() {
    let dir = tempdir().unwrap();
    let mut session = session(dir.path(), Faults::default(), vec![Event::empty("x")]);
    assert!(!session.parser().is_closed());
    session.abort();
    assert!(session.is_closed());
    assert!(session.parser().is_closed());
    assert!(matches!(session.build(), Err(ArborError::Closed)));
}

fn damage_info(root: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let path = root.join("db").join(DbFile::Info.file_name());
    let mut info: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    edit(&mut info);
    std::fs::write(&path, serde_json::to_vec(&info).unwrap()).unwrap();
}

#[test]
fn damaged_name_dictionary_is_corruption() {
    let dir = tempdir().unwrap();
    let mut session = session(
        dir.path(),
        Faults::default(),
        vec![Event::open("root"), Event::empty("a"), Event::CloseElem],
    );
    session.build().unwrap();
    reopen(dir.path()).unwrap();

    damage_info(dir.path(), |info| {
        let names: Vec<String> = (0..70_000).map(|i| format!("n{i}")).collect();
        info["elem_names"]["names"] = serde_json::json!(names);
        info["elem_names"]["counts"] = serde_json::json!(vec![1u64; 70_000]);
    });
    assert!(matches!(reopen(dir.path()), Err(ArborError::Corruption(_))));

    damage_info(dir.path(), |info| {
        info["elem_names"]["names"] = serde_json::json!(["a", "a"]);
        info["elem_names"]["counts"] = serde_json::json!([1, 1]);
    });
    assert!(matches!(reopen(dir.path()), Err(ArborError::Corruption(_))));
}
