//! Binary document reader.
//!
//! The mirror of [`crate::writer`]: reads the uncompressed header, inflates
//! the body if the header says so, and rebuilds the arena [`Tree`]. Every
//! branch of the writer is replayed in the same order, including the
//! empty-string-as-absent instance name and the backreference short-circuit.
//!
//! Reference ids are resolved through a map from id to [`NodeId`] filled in
//! as element headers are read, so an alias may point at any element whose
//! header came earlier in the stream, ancestors included.
//!
//! # Security
//!
//! The reader is safe on untrusted input within its limits: nesting depth is
//! capped by [`ReadOptions::max_depth`], value lengths are checked against
//! their field-class maximum before allocating, and counts are consumed one
//! item at a time so a huge declared count only costs the bytes actually
//! present.

mod decoder;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::debug;

use crate::error::{DecodeError, DecodeErrorKind};
use crate::stream::{BinaryReader, DecompressionAdapter};
use crate::tree::{NodeId, Tree};
use crate::writer::{DEFAULT_MAX_CUSTOM_FIELD_LENGTH, DEFAULT_MAX_DEPTH, SIGNATURE};
use decoder::Decoder;

/// Options controlling document input.
///
/// ```
/// use tamloxide::reader::ReadOptions;
///
/// let opts = ReadOptions::default().max_depth(64).expected_version(Some(1));
/// assert_eq!(opts.max_depth, 64);
/// ```
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Maximum nesting depth of elements and custom nodes.
    pub max_depth: u32,
    /// Maximum length in bytes of a custom node field value. Must be at least
    /// the value the writer used.
    pub max_custom_field_length: usize,
    /// When set, documents carrying any other version tag are rejected.
    /// Defaults to `None`: the tag is reported but not enforced.
    pub expected_version: Option<u32>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_custom_field_length: DEFAULT_MAX_CUSTOM_FIELD_LENGTH,
            expected_version: None,
        }
    }
}

impl ReadOptions {
    /// Sets the maximum nesting depth.
    #[must_use]
    pub fn max_depth(mut self, max: u32) -> Self {
        self.max_depth = max;
        self
    }

    /// Sets the maximum custom field value length.
    #[must_use]
    pub fn max_custom_field_length(mut self, max: usize) -> Self {
        self.max_custom_field_length = max;
        self
    }

    /// Requires a specific version tag.
    #[must_use]
    pub fn expected_version(mut self, version: Option<u32>) -> Self {
        self.expected_version = version;
        self
    }
}

/// The uncompressed document header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Version tag.
    pub version: u32,
    /// Whether the body is deflated.
    pub compressed: bool,
}

/// A decoded document.
#[derive(Debug, Clone)]
pub struct Document {
    /// The header it was read with.
    pub header: Header,
    /// All decoded elements and custom nodes.
    pub tree: Tree,
    /// The root element.
    pub root: NodeId,
}

/// Reads and checks the header.
///
/// # Errors
///
/// Fails on a wrong signature, a rejected version, or truncated input.
pub fn read_header<R: Read>(
    input: &mut BinaryReader<R>,
    options: &ReadOptions,
) -> Result<Header, DecodeError> {
    let signature = input.read_string()?;
    if signature != SIGNATURE {
        return Err(DecodeError::new(DecodeErrorKind::BadSignature(signature), 0));
    }
    let version_offset = input.position();
    let version = input.read_u32()?;
    if options.expected_version.is_some_and(|v| v != version) {
        return Err(DecodeError::new(
            DecodeErrorKind::UnsupportedVersion(version),
            version_offset,
        ));
    }
    let compressed = input.read_bool()?;
    Ok(Header {
        version,
        compressed,
    })
}

/// Reads a whole document from `source`.
///
/// Trailing bytes after the root element are an error. For a compressed
/// document this covers both the inflated body and any bytes left in
/// `source` after the end of the deflate stream.
///
/// # Errors
///
/// Returns [`DecodeError`] on malformed input, failed limits, or I/O failure.
///
/// # Examples
///
/// ```
/// use tamloxide::Tree;
/// use tamloxide::reader::{read_document, ReadOptions};
/// use tamloxide::writer::{write_document_to_vec, WriteOptions};
///
/// let mut tree = Tree::new();
/// let root = tree.create_element("Scene");
/// tree.add_field(root, "gravity", "9.8");
/// let bytes = write_document_to_vec(&tree, root, &WriteOptions::default().compressed(true)).unwrap();
///
/// let doc = read_document(&bytes[..], &ReadOptions::default()).unwrap();
/// assert!(doc.header.compressed);
/// assert_eq!(doc.tree.field(doc.root, "gravity"), Some("9.8"));
/// ```
pub fn read_document<R: Read>(source: R, options: &ReadOptions) -> Result<Document, DecodeError> {
    let mut input = BinaryReader::new(source);
    let header = read_header(&mut input, options)?;
    debug!(
        "reading document: version {}, compressed {}",
        header.version, header.compressed
    );

    let (tree, root) = if header.compressed {
        let body_start = input.position();
        let mut body = BinaryReader::new(DecompressionAdapter::attach(input.into_inner()));
        let decoded = decode_body(&mut body, options)?;
        let inflater = body.into_inner();
        let consumed = inflater.total_in();
        let mut rest = BinaryReader::new(inflater.detach());
        if !rest.is_at_end()? {
            return Err(DecodeError::new(
                DecodeErrorKind::TrailingData,
                body_start + consumed,
            ));
        }
        decoded
    } else {
        decode_body(&mut input, options)?
    };

    debug!(
        "read {} elements, {} custom nodes",
        tree.node_count(),
        tree.custom_node_count()
    );
    Ok(Document { header, tree, root })
}

fn decode_body<R: Read>(
    body: &mut BinaryReader<R>,
    options: &ReadOptions,
) -> Result<(Tree, NodeId), DecodeError> {
    let decoded = Decoder::new(options).decode(body)?;
    if !body.is_at_end()? {
        return Err(body.error(DecodeErrorKind::TrailingData));
    }
    Ok(decoded)
}

/// Reads a document from a byte slice.
///
/// # Errors
///
/// See [`read_document`].
pub fn read_document_from_slice(bytes: &[u8], options: &ReadOptions) -> Result<Document, DecodeError> {
    read_document(bytes, options)
}

/// Reads a document from a file.
///
/// # Errors
///
/// See [`read_document`]. Failure to open the file is reported as an I/O
/// error at offset 0.
pub fn read_document_from_file(
    path: impl AsRef<Path>,
    options: &ReadOptions,
) -> Result<Document, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::new(DecodeErrorKind::Io(e), 0))?;
    read_document(BufReader::new(file), options)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::writer::{write_document_to_vec, WriteOptions};

    fn sample() -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let root = tree.create_element("Scene");
        tree.set_instance_name(root, "level1");
        let child = tree.create_element("Sprite");
        tree.add_field(child, "pos", "1 2");
        tree.append_child(root, child);
        (tree, root)
    }

    #[test]
    fn test_bad_signature() {
        let bytes = b"\x04Tam!\x01\x00\x00\x00\x00";
        let err = read_document_from_slice(bytes, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::BadSignature(ref s) if s == "Tam!"));
    }

    #[test]
    fn test_version_check() {
        let (tree, root) = sample();
        let bytes =
            write_document_to_vec(&tree, root, &WriteOptions::default().version(7)).unwrap();
        let doc = read_document_from_slice(&bytes, &ReadOptions::default()).unwrap();
        assert_eq!(doc.header.version, 7);

        let opts = ReadOptions::default().expected_version(Some(1));
        let err = read_document_from_slice(&bytes, &opts).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::UnsupportedVersion(7)));
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn test_trailing_data_rejected() {
        let (tree, root) = sample();
        let mut bytes = write_document_to_vec(&tree, root, &WriteOptions::default()).unwrap();
        bytes.push(0);
        let err = read_document_from_slice(&bytes, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::TrailingData));
    }

    #[test]
    fn test_bytes_after_compressed_stream_rejected() {
        let (tree, root) = sample();
        let mut bytes =
            write_document_to_vec(&tree, root, &WriteOptions::default().compressed(true)).unwrap();
        let stream_end = bytes.len() as u64;
        bytes.extend_from_slice(b"junk");
        let err = read_document_from_slice(&bytes, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::TrailingData));
        assert_eq!(err.offset, stream_end);
    }

    #[test]
    fn test_instance_name_sentinel() {
        let (tree, root) = sample();
        let bytes = write_document_to_vec(&tree, root, &WriteOptions::default()).unwrap();
        let doc = read_document_from_slice(&bytes, &ReadOptions::default()).unwrap();
        assert_eq!(doc.tree.node(doc.root).instance_name.as_deref(), Some("level1"));
        let child = doc.tree.children(doc.root)[0];
        assert_eq!(doc.tree.node(child).instance_name, None);
    }

    #[test]
    fn test_read_from_file() {
        let (tree, root) = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.taml");
        crate::writer::write_document_to_file(&tree, root, &path, &WriteOptions::default())
            .unwrap();
        let doc = read_document_from_file(&path, &ReadOptions::default()).unwrap();
        assert_eq!(doc.tree.node(doc.root).type_name, "Scene");
        assert_eq!(doc.tree.node_count(), 2);
    }
}
