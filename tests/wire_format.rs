//! Byte-exact layout tests.
//!
//! The format is order-sensitive and has no tags, so these pin down every
//! byte the writer produces for small but complete documents.

#![allow(clippy::unwrap_used)]

use std::io::Read;

use flate2::read::DeflateDecoder;
use pretty_assertions::assert_eq;

use tamloxide::reader::{read_document_from_slice, ReadOptions};
use tamloxide::writer::{write_document_to_vec, WriteOptions};
use tamloxide::Tree;

#[derive(Default)]
struct Bytes(Vec<u8>);

impl Bytes {
    fn u8(mut self, n: u8) -> Self {
        self.0.push(n);
        self
    }

    fn u32(mut self, n: u32) -> Self {
        self.0.extend_from_slice(&n.to_le_bytes());
        self
    }

    #[allow(clippy::cast_possible_truncation)]
    fn str(mut self, s: &str) -> Self {
        self.0.push(s.len() as u8);
        self.0.extend_from_slice(s.as_bytes());
        self
    }

    #[allow(clippy::cast_possible_truncation)]
    fn lstr(mut self, s: &str) -> Self {
        self.0.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.0.extend_from_slice(s.as_bytes());
        self
    }
}

#[test]
fn test_header_layout() {
    let mut tree = Tree::new();
    let root = tree.create_element("A");

    let plain = write_document_to_vec(&tree, root, &WriteOptions::default()).unwrap();
    assert_eq!(&plain[..10], b"\x04Taml\x01\x00\x00\x00\x00");

    let tagged =
        write_document_to_vec(&tree, root, &WriteOptions::default().version(0x0102_0304))
            .unwrap();
    assert_eq!(&tagged[..10], b"\x04Taml\x04\x03\x02\x01\x00");

    let packed =
        write_document_to_vec(&tree, root, &WriteOptions::default().compressed(true)).unwrap();
    assert_eq!(&packed[..10], b"\x04Taml\x01\x00\x00\x00\x01");
}

#[test]
fn test_document_layout() {
    let mut tree = Tree::new();
    let root = tree.create_element("Scene");
    tree.set_instance_name(root, "main");
    tree.add_field(root, "w", "640");

    let asset = tree.create_element("Tex");
    tree.add_field(asset, "file", "a.png");
    tree.append_child(root, asset);
    let alias = tree.create_reference(asset);
    tree.append_child(root, alias);

    let meta = tree.create_custom_node("Meta");
    let sub = tree.create_custom_node("Sub");
    tree.append_custom_child(meta, sub);
    tree.add_custom_field(meta, "k", "v");
    tree.attach_custom_node(root, meta);

    let expected = Bytes::default()
        .str("Taml")
        .u32(1)
        .u8(0)
        // Scene
        .str("Scene")
        .str("main")
        .u32(0)
        .u32(0)
        .u32(1)
        .str("w")
        .lstr("640")
        .u32(2)
        // Tex, first occurrence with id 1
        .str("Tex")
        .str("")
        .u32(1)
        .u32(0)
        .u32(1)
        .str("file")
        .lstr("a.png")
        .u32(0)
        .u32(0)
        // Tex alias: header only
        .str("Tex")
        .str("")
        .u32(0)
        .u32(1)
        // Scene custom nodes
        .u32(1)
        .str("Meta")
        .u8(0)
        .u32(1)
        .str("Sub")
        .u8(0)
        .u32(0)
        .u32(0)
        // Meta fields come after its children
        .u32(1)
        .str("k")
        .lstr("v");

    let bytes = write_document_to_vec(&tree, root, &WriteOptions::default()).unwrap();
    assert_eq!(bytes, expected.0);

    let doc = read_document_from_slice(&bytes, &ReadOptions::default()).unwrap();
    let again = write_document_to_vec(&doc.tree, doc.root, &WriteOptions::default()).unwrap();
    assert_eq!(again, expected.0);
}

#[test]
fn test_proxy_layout() {
    let mut tree = Tree::new();
    let root = tree.create_element("A");
    let wrapped = tree.create_element("B");
    tree.set_instance_name(wrapped, "x");
    let proxy = tree.create_proxy_custom_node("P", wrapped);
    tree.attach_custom_node(root, proxy);

    let expected = Bytes::default()
        .str("Taml")
        .u32(1)
        .u8(0)
        .str("A")
        .str("")
        .u32(0)
        .u32(0)
        .u32(0)
        .u32(0)
        .u32(1)
        // Proxy: name, flag, then a full element
        .str("P")
        .u8(1)
        .str("B")
        .str("x")
        .u32(0)
        .u32(0)
        .u32(0)
        .u32(0)
        .u32(0);

    let bytes = write_document_to_vec(&tree, root, &WriteOptions::default()).unwrap();
    assert_eq!(bytes, expected.0);
}

#[test]
fn test_compressed_body_inflates_to_plain_body() {
    let mut tree = Tree::new();
    let root = tree.create_element("List");
    for i in 0..20 {
        let item = tree.create_element("Item");
        tree.add_field(item, "n", i.to_string());
        tree.append_child(root, item);
    }

    let plain = write_document_to_vec(&tree, root, &WriteOptions::default()).unwrap();
    for level in [0, 1, 6, 9] {
        let opts = WriteOptions::default()
            .compressed(true)
            .compression_level(level);
        let packed = write_document_to_vec(&tree, root, &opts).unwrap();
        let mut body = Vec::new();
        DeflateDecoder::new(&packed[10..])
            .read_to_end(&mut body)
            .unwrap();
        assert_eq!(body, &plain[10..], "compression level {level}");
    }
}

#[test]
fn test_ids_assigned_in_creation_order() {
    let mut tree = Tree::new();
    let root = tree.create_element("R");
    let a = tree.create_element("A");
    let b = tree.create_element("B");
    tree.append_child(root, a);
    tree.append_child(root, b);
    // Reference b first so it gets id 1.
    let rb = tree.create_reference(b);
    let ra = tree.create_reference(a);
    tree.append_child(root, rb);
    tree.append_child(root, ra);

    let bytes = write_document_to_vec(&tree, root, &WriteOptions::default()).unwrap();
    let expected_tail = Bytes::default()
        .str("B")
        .str("")
        .u32(0)
        .u32(1)
        .str("A")
        .str("")
        .u32(0)
        .u32(2)
        .u32(0);
    assert!(bytes.ends_with(&expected_tail.0));
}
