#![allow(missing_docs)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use arbor::build::{CsvOptions, CsvParser};
use arbor::primitives::io::{DirLocation, Location};
use arbor::storage::BuildOptions;
use arbor::{DiskBuilder, DiskData, NodeId, NodeKind, Result};
use tempfile::tempdir;

fn import(dir: &Path, input: &str, opts: CsvOptions) -> Result<DiskData> {
    let location: Arc<dyn Location> = Arc::new(DirLocation::new(dir.join("db")));
    let parser = CsvParser::from_reader(
        Cursor::new(input.as_bytes().to_vec()),
        "people.csv",
        input.len() as u64,
        opts,
    );
    let mut session = DiskBuilder::new(
        "people",
        location,
        parser,
        BuildOptions::default().memory_headroom(1 << 30),
    );
    session.build()
}

fn text(data: &DiskData, pre: u32) -> String {
    let bytes = data.value(NodeId(pre)).unwrap().unwrap();
    String::from_utf8(bytes).unwrap()
}

fn name(data: &DiskData, pre: u32) -> &str {
    data.name(NodeId(pre)).unwrap().unwrap()
}

#[test]
fn header_row_names_the_fields() {
    let dir = tempdir().unwrap();
    let opts = CsvOptions {
        header: true,
        ..CsvOptions::default()
    };
    let data = import(dir.path(), "name,age\nAnn,42\nBob,x\n", opts).unwrap();

    assert_eq!(data.size(), 12);
    assert_eq!(data.kind(NodeId(0)).unwrap(), NodeKind::Document);
    assert_eq!(text(&data, 0), "people.csv");
    assert_eq!(data.subtree_size(NodeId(0)).unwrap(), 11);
    assert_eq!(name(&data, 1), "csv");
    assert_eq!(data.subtree_size(NodeId(1)).unwrap(), 10);
    assert_eq!(name(&data, 2), "record");
    assert_eq!(data.subtree_size(NodeId(2)).unwrap(), 4);
    assert_eq!(name(&data, 3), "name");
    assert_eq!(text(&data, 4), "Ann");
    assert_eq!(name(&data, 5), "age");
    assert_eq!(text(&data, 6), "42");
    assert_eq!(name(&data, 7), "record");
    assert_eq!(text(&data, 11), "x");
    assert_eq!(data.parent(NodeId(11)).unwrap(), Some(NodeId(10)));
    assert_eq!(data.elem_names().count(data.elem_names().id("record").unwrap()), 2);
    assert_eq!(data.meta().source.as_deref(), Some("people.csv"));
    data.verify().unwrap();
}

#[test]
fn attribute_mode_keeps_raw_column_names() {
    let dir = tempdir().unwrap();
    let opts = CsvOptions {
        header: true,
        attributes: true,
        ..CsvOptions::default()
    };
    let data = import(dir.path(), "first name,age\nAnn,42\n", opts).unwrap();

    assert_eq!(data.size(), 9);
    assert_eq!(name(&data, 2), "record");
    assert_eq!(data.subtree_size(NodeId(2)).unwrap(), 6);
    assert_eq!(name(&data, 3), "entry");
    assert_eq!(data.attr_count(NodeId(3)).unwrap(), 1);
    assert_eq!(data.kind(NodeId(4)).unwrap(), NodeKind::Attribute);
    assert_eq!(name(&data, 4), "name");
    assert_eq!(text(&data, 4), "first name");
    assert_eq!(text(&data, 5), "Ann");
    assert_eq!(text(&data, 7), "age");
    assert_eq!(data.parent(NodeId(7)).unwrap(), Some(NodeId(6)));
    data.verify().unwrap();
}

#[test]
fn without_header_every_field_is_an_entry() {
    let dir = tempdir().unwrap();
    let data = import(dir.path(), "a,,c\n", CsvOptions::default()).unwrap();

    // doc, csv, record, entry, text, entry, entry, text
    assert_eq!(data.size(), 8);
    assert_eq!(name(&data, 3), "entry");
    assert_eq!(text(&data, 4), "a");
    assert_eq!(name(&data, 5), "entry");
    assert_eq!(data.subtree_size(NodeId(5)).unwrap(), 0);
    assert_eq!(name(&data, 6), "entry");
    assert_eq!(text(&data, 7), "c");
    assert_eq!(data.subtree_size(NodeId(2)).unwrap(), 5);
}

#[test]
fn custom_delimiter() {
    let dir = tempdir().unwrap();
    let opts = CsvOptions {
        delimiter: b';',
        ..CsvOptions::default()
    };
    let data = import(dir.path(), "x;y,z\n", opts).unwrap();
    assert_eq!(text(&data, 4), "x");
    assert_eq!(text(&data, 6), "y,z");
}

#[test]
fn header_names_are_made_valid() {
    let dir = tempdir().unwrap();
    let opts = CsvOptions {
        header: true,
        ..CsvOptions::default()
    };
    let data = import(dir.path(), "first name,1st\nA,B\n", opts).unwrap();
    assert_eq!(name(&data, 3), "first_name");
    assert_eq!(name(&data, 5), "_st");

    let strict = CsvOptions {
        header: true,
        lax: false,
        ..CsvOptions::default()
    };
    let data = import(dir.path(), "first name,a_b\nA,B\n", strict).unwrap();
    assert_eq!(name(&data, 3), "first_0020name");
    assert_eq!(name(&data, 5), "a__b");
}

#[test]
fn a_header_without_rows_is_an_empty_table() {
    let dir = tempdir().unwrap();
    let opts = CsvOptions {
        header: true,
        ..CsvOptions::default()
    };
    let data = import(dir.path(), "name,age\n", opts).unwrap();
    assert_eq!(data.size(), 2);
    assert_eq!(data.subtree_size(NodeId(1)).unwrap(), 0);
}
