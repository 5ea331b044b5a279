#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;

use arbor::build::{Atts, Event, EventParser, NsDecls};
use arbor::primitives::io::{DbFile, DirLocation, Location};
use arbor::storage::{BuildOptions, CodecKind, NodeRecord, ValueRef, XML_URI};
use arbor::{DiskBuilder, DiskData, NodeId, NodeKind};
use proptest::prelude::*;
use tempfile::tempdir;

fn opts() -> BuildOptions {
    BuildOptions::default().memory_headroom(1 << 30)
}

fn build_with(dir: &Path, events: Vec<Event>, opts: BuildOptions) -> DiskData {
    let location: Arc<dyn Location> = Arc::new(DirLocation::new(dir.join("db")));
    let mut session = DiskBuilder::new("scenario", location, EventParser::new(events), opts);
    session.build().expect("build")
}

fn build(dir: &Path, events: Vec<Event>) -> DiskData {
    build_with(dir, events, opts())
}

fn elem_with(name: &str, atts: &[(&str, &str)]) -> Event {
    Event::open_with(name, atts.iter().map(|(n, v)| (*n, v.as_bytes().to_vec())))
}

#[test]
fn single_empty_root() {
    let dir = tempdir().unwrap();
    let location: Arc<dyn Location> = Arc::new(DirLocation::new(dir.path().join("db")));
    let parser = EventParser::new(vec![Event::empty("root")]).with_source("root.xml");
    let data = DiskBuilder::new("scenario", location, parser, opts())
        .build()
        .unwrap();
    assert_eq!(data.meta().source.as_deref(), Some("root.xml"));
    assert_eq!(data.size(), 1);
    assert_eq!(data.kind(NodeId(0)).unwrap(), NodeKind::Element);
    assert_eq!(data.subtree_size(NodeId(0)).unwrap(), 0);
    assert_eq!(data.parent(NodeId(0)).unwrap(), None);
    assert_eq!(data.name(NodeId(0)).unwrap(), Some("root"));
    data.verify().unwrap();
}

#[test]
fn root_with_three_children() {
    let dir = tempdir().unwrap();
    let data = build(
        dir.path(),
        vec![
            Event::open("root"),
            Event::empty("a"),
            Event::empty("b"),
            Event::empty("c"),
            Event::CloseElem,
        ],
    );
    assert_eq!(data.size(), 4);
    assert_eq!(data.subtree_size(NodeId(0)).unwrap(), 3);
    for child in 1..4 {
        assert_eq!(data.parent(NodeId(child)).unwrap(), Some(NodeId(0)));
        assert_eq!(data.subtree_size(NodeId(child)).unwrap(), 0);
    }
}

#[test]
fn integer_attribute_is_inline() {
    let dir = tempdir().unwrap();
    let data = build(
        dir.path(),
        vec![
            elem_with("item", &[("count", "42"), ("delta", "-17")]),
            Event::text("-999"),
            Event::CloseElem,
        ],
    );
    match data.record(NodeId(1)).unwrap() {
        NodeRecord::Attribute { value, dist, .. } => {
            assert_eq!(value, ValueRef::Inline(42));
            assert_eq!(dist, 1);
        }
        other => panic!("unexpected record {other:?}"),
    }
    assert_eq!(data.value(NodeId(1)).unwrap().unwrap(), b"42");
    assert_eq!(data.record(NodeId(2)).unwrap().value(), Some(ValueRef::Inline(-17)));
    assert_eq!(data.value(NodeId(2)).unwrap().unwrap(), b"-17");
    assert_eq!(data.record(NodeId(3)).unwrap().value(), Some(ValueRef::Inline(-999)));
    assert_eq!(data.value(NodeId(3)).unwrap().unwrap(), b"-999");
    assert_eq!(data.meta().value_bytes, 0);
    assert_eq!(data.meta().text_bytes, 0);
    assert_eq!(data.meta().heap.inline_values, 3);
    assert_eq!(data.attr_count(NodeId(0)).unwrap(), 2);
}

#[test]
fn non_inline_values_roundtrip_verbatim() {
    let dir = tempdir().unwrap();
    let values = ["007", "-0", "+5", "1234567890", "3.14", "hello", ""];
    let atts: Vec<(String, &str)> = values
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("a{i}"), *v))
        .collect();
    let atts: Vec<(&str, &str)> = atts.iter().map(|(n, v)| (n.as_str(), *v)).collect();
    let data = build(dir.path(), vec![elem_with("e", &atts), Event::CloseElem]);
    for (i, expected) in values.iter().enumerate() {
        let pre = NodeId(i as u32 + 1);
        let record = data.record(pre).unwrap();
        assert!(!record.value().unwrap().is_inline(), "{expected}");
        assert_eq!(data.value(pre).unwrap().unwrap(), expected.as_bytes());
    }
}

#[test]
fn repetitive_text_is_compressed() {
    let dir = tempdir().unwrap();
    let text: Vec<u8> = b"abcdefghij".iter().copied().cycle().take(10_000).collect();
    let data = build(
        dir.path(),
        vec![Event::open("doc"), Event::text(text.clone()), Event::CloseElem],
    );
    match data.record(NodeId(1)).unwrap().value().unwrap() {
        ValueRef::Heap { compressed, .. } => assert!(compressed),
        other => panic!("unexpected reference {other:?}"),
    }
    assert!(data.meta().text_bytes < 10_000);
    assert_eq!(data.value(NodeId(1)).unwrap().unwrap(), text);
}

#[test]
fn disabled_codec_keeps_text_raw() {
    let dir = tempdir().unwrap();
    let text = vec![b'a'; 10_000];
    let data = build_with(
        dir.path(),
        vec![Event::open("doc"), Event::text(text.clone()), Event::CloseElem],
        opts().codec(CodecKind::None),
    );
    assert!(matches!(
        data.record(NodeId(1)).unwrap().value().unwrap(),
        ValueRef::Heap {
            compressed: false,
            ..
        }
    ));
    assert_eq!(data.value(NodeId(1)).unwrap().unwrap(), text);
}

#[test]
fn document_with_mixed_content() {
    let dir = tempdir().unwrap();
    let data = build(
        dir.path(),
        vec![
            Event::OpenDoc(b"library.xml".to_vec()),
            Event::Comment(b" catalogue ".to_vec()),
            elem_with("library", &[("city", "Konstanz")]),
            elem_with("book", &[("id", "1"), ("lang", "en")]),
            Event::text("Dune"),
            Event::CloseElem,
            Event::Pi {
                target: "render".into(),
                data: b"fast".to_vec(),
            },
            Event::open("book"),
            Event::text("  "),
            Event::CloseElem,
            Event::CloseElem,
            Event::CloseDoc,
        ],
    );
    let kinds: Vec<NodeKind> = (0..data.size())
        .map(|pre| data.kind(NodeId(pre)).unwrap())
        .collect();
    assert_eq!(
        kinds,
        [
            NodeKind::Document,
            NodeKind::Comment,
            NodeKind::Element,
            NodeKind::Attribute,
            NodeKind::Element,
            NodeKind::Attribute,
            NodeKind::Attribute,
            NodeKind::Text,
            NodeKind::ProcessingInstruction,
            NodeKind::Element,
        ]
    );
    assert_eq!(data.subtree_size(NodeId(0)).unwrap(), 9);
    assert_eq!(data.subtree_size(NodeId(2)).unwrap(), 7);
    assert_eq!(data.subtree_size(NodeId(4)).unwrap(), 3);
    assert_eq!(data.subtree_size(NodeId(9)).unwrap(), 0);
    assert_eq!(data.value(NodeId(0)).unwrap().unwrap(), b"library.xml");
    assert_eq!(data.value(NodeId(8)).unwrap().unwrap(), b"render fast");
    assert_eq!(data.parent(NodeId(6)).unwrap(), Some(NodeId(4)));
    assert_eq!(data.parent(NodeId(8)).unwrap(), Some(NodeId(2)));
    assert_eq!(data.parent(NodeId(1)).unwrap(), Some(NodeId(0)));
    assert_eq!(data.parent(NodeId(0)).unwrap(), None);
    assert_eq!(data.name(NodeId(6)).unwrap(), Some("lang"));
    assert_eq!(data.elem_names().count(data.elem_names().id("book").unwrap()), 2);
    assert_eq!(data.meta().name, "scenario");
    data.verify().unwrap();
}

#[test]
fn many_attributes_resolve_past_the_saturated_field() {
    let dir = tempdir().unwrap();
    let names: Vec<String> = (0..40).map(|i| format!("a{i}")).collect();
    let atts: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "v")).collect();
    let data = build(
        dir.path(),
        vec![Event::open("root"), elem_with("wide", &atts), Event::CloseElem, Event::CloseElem],
    );
    let wide = NodeId(1);
    match data.record(wide).unwrap() {
        NodeRecord::Element { attrs, .. } => assert_eq!(attrs, 31),
        other => panic!("unexpected record {other:?}"),
    }
    assert_eq!(data.attr_count(wide).unwrap(), 40);
    assert_eq!(data.subtree_size(wide).unwrap(), 40);
    assert_eq!(data.parent(NodeId(2)).unwrap(), Some(wide));
    assert_eq!(data.parent(NodeId(41)).unwrap(), Some(wide));
    data.verify().unwrap();
}

#[test]
fn namespaces_are_resolved_and_recorded() {
    let dir = tempdir().unwrap();
    let mut nsp = NsDecls::new();
    nsp.push(("".into(), "urn:books".into()));
    nsp.push(("x".into(), "urn:extra".into()));
    let mut atts = Atts::new();
    atts.push(("x:flag".into(), b"yes".to_vec()));
    atts.push(("xml:lang".into(), b"de".to_vec()));
    let data = build(
        dir.path(),
        vec![
            Event::OpenElem {
                name: "shelf".into(),
                atts,
                nsp,
            },
            Event::empty("book"),
            Event::CloseElem,
        ],
    );
    assert_eq!(data.uri(NodeId(0)).unwrap(), Some("urn:books"));
    assert_eq!(data.uri(NodeId(1)).unwrap(), Some("urn:extra"));
    assert_eq!(data.uri(NodeId(2)).unwrap(), Some(XML_URI));
    assert_eq!(data.uri(NodeId(3)).unwrap(), Some("urn:books"));
    match data.record(NodeId(0)).unwrap() {
        NodeRecord::Element { ns, .. } => assert!(ns),
        other => panic!("unexpected record {other:?}"),
    }
    let bindings = data.namespaces().bindings();
    assert_eq!(bindings.len(), 2);
    assert!(bindings.iter().all(|b| b.pre == 0));
}

#[test]
fn rebuilding_replaces_the_previous_database() {
    let dir = tempdir().unwrap();
    let first = build(dir.path(), vec![Event::open("a"), Event::empty("b"), Event::CloseElem]);
    assert_eq!(first.size(), 2);
    drop(first);
    let second = build(dir.path(), vec![Event::empty("only")]);
    assert_eq!(second.size(), 1);
    assert_eq!(second.elem_names().len(), 1);

    let location: Arc<dyn Location> = Arc::new(DirLocation::new(dir.path().join("db")));
    let reopened = DiskData::open(location.clone()).unwrap();
    assert_eq!(reopened.size(), 1);
    assert!(!location.exists(DbFile::Ledger));
}

#[derive(Clone, Debug)]
enum Tree {
    Elem {
        name: u8,
        atts: u8,
        children: Vec<Tree>,
    },
    Text(String),
}

fn tree() -> impl Strategy<Value = Tree> {
    let leaf = prop_oneof![
        "[a-z0-9 ]{1,12}".prop_map(Tree::Text),
        (0u8..6, 0u8..3).prop_map(|(name, atts)| Tree::Elem {
            name,
            atts,
            children: Vec::new()
        }),
    ];
    leaf.prop_recursive(5, 64, 6, |inner| {
        (0u8..6, 0u8..4, prop::collection::vec(inner, 0..6)).prop_map(
            |(name, atts, children)| Tree::Elem {
                name,
                atts,
                children,
            },
        )
    })
}

fn emit(tree: &Tree, out: &mut Vec<Event>, emitted: &mut u32) {
    match tree {
        Tree::Elem {
            name,
            atts,
            children,
        } => {
            let atts: Vec<(String, Vec<u8>)> = (0..*atts)
                .map(|i| (format!("at{i}"), format!("{}", i as u32 * 7).into_bytes()))
                .collect();
            *emitted += 1 + atts.len() as u32;
            out.push(Event::open_with(format!("e{name}"), atts));
            for child in children {
                emit(child, out, emitted);
            }
            out.push(Event::CloseElem);
        }
        Tree::Text(text) => {
            // Chopping drops whitespace-only text.
            if !text.trim().is_empty() {
                *emitted += 1;
            }
            out.push(Event::text(text.clone()));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn sizes_match_descendant_counts(root in tree(), with_doc in any::<bool>()) {
        let mut events = Vec::new();
        let mut emitted = 0u32;
        if with_doc {
            events.push(Event::OpenDoc(b"doc".to_vec()));
            emitted += 1;
        }
        emit(&root, &mut events, &mut emitted);
        if with_doc {
            events.push(Event::CloseDoc);
        }

        let dir = tempdir().unwrap();
        let data = build(dir.path(), events);
        prop_assert_eq!(data.size(), emitted);

        let mut descendants = vec![0u32; data.size() as usize];
        for pre in 0..data.size() {
            // record() fails unless the stored id equals the row
            let _ = data.record(NodeId(pre)).unwrap();
            let mut node = NodeId(pre);
            while let Some(parent) = data.parent(node).unwrap() {
                prop_assert!(parent < node);
                descendants[parent.0 as usize] += 1;
                node = parent;
            }
        }
        for pre in 0..data.size() {
            let kind = data.kind(NodeId(pre)).unwrap();
            let size = data.subtree_size(NodeId(pre)).unwrap();
            if kind.is_container() {
                prop_assert_eq!(size, descendants[pre as usize]);
            } else {
                prop_assert_eq!(size, 0);
                prop_assert_eq!(descendants[pre as usize], 0);
            }
        }
        data.verify().unwrap();
    }
}
