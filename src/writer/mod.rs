//! Binary document writer.
//!
//! A document is a short uncompressed header (signature, version, compressed
//! flag) followed by the root element, optionally routed through a deflate
//! [`CompressionAdapter`]. The header is never compressed, so a reader can
//! decide how to treat the body before inflating anything.
//!
//! ```text
//! Document := Signature:str Version:u32 Compressed:bool Element
//! ```
//!
//! The element encoding itself lives in `encoder`.

mod encoder;

pub use encoder::EncodeStats;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, warn};

use crate::error::EncodeError;
use crate::stream::{BinaryWriter, CompressionAdapter};
use crate::tree::{NodeId, Tree};
use encoder::Encoder;

/// Format signature written at the start of every document.
pub const SIGNATURE: &str = "Taml";

/// Format version written by default.
pub const FORMAT_VERSION: u32 = 1;

/// Maximum length in bytes of an attribute value on an element.
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 4096;

/// Default maximum length in bytes of a custom node field value.
pub const DEFAULT_MAX_CUSTOM_FIELD_LENGTH: usize = 16 * 1024;

/// Maximum length in bytes of any name (type, instance, field, custom node).
pub const MAX_NAME_LENGTH: usize = crate::stream::MAX_SHORT_STRING_LENGTH;

/// Default maximum nesting depth, counting elements and custom nodes.
pub const DEFAULT_MAX_DEPTH: u32 = 2048;

/// Default deflate level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// What to do with a string longer than its field class allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Fail the whole document with [`EncodeError::ValueTooLong`].
    #[default]
    Reject,
    /// Cut the string at the last UTF-8 character boundary at or below the
    /// maximum. Lossy: the reader sees only the truncated value.
    Truncate,
}

/// Options controlling document output.
///
/// ```
/// use tamloxide::writer::{OversizePolicy, WriteOptions};
///
/// let opts = WriteOptions::default()
///     .compressed(true)
///     .oversize(OversizePolicy::Truncate)
///     .max_depth(512);
/// assert!(opts.compressed);
/// ```
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Route the body through the deflate adapter. Defaults to `false`.
    pub compressed: bool,
    /// Deflate level (0-9) used when `compressed` is set.
    pub compression_level: u32,
    /// Version tag written into the header.
    pub version: u32,
    /// Maximum nesting depth of elements and custom nodes.
    pub max_depth: u32,
    /// Maximum length in bytes of a custom node field value.
    pub max_custom_field_length: usize,
    /// Policy for strings over their maximum length.
    pub oversize: OversizePolicy,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compressed: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            version: FORMAT_VERSION,
            max_depth: DEFAULT_MAX_DEPTH,
            max_custom_field_length: DEFAULT_MAX_CUSTOM_FIELD_LENGTH,
            oversize: OversizePolicy::Reject,
        }
    }
}

impl WriteOptions {
    /// Enables or disables body compression.
    #[must_use]
    pub fn compressed(mut self, yes: bool) -> Self {
        self.compressed = yes;
        self
    }

    /// Sets the deflate level (clamped to 9).
    #[must_use]
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Sets the version tag.
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

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

    /// Sets the oversize string policy.
    #[must_use]
    pub fn oversize(mut self, policy: OversizePolicy) -> Self {
        self.oversize = policy;
        self
    }
}

/// Writes the document rooted at `root` to `sink` and hands the sink back.
///
/// The header goes straight to `sink`. When `options.compressed` is set the
/// body goes through a [`CompressionAdapter`], which is finalized before
/// returning; if encoding fails midway the adapter is still finalized when
/// it is dropped. Any failure aborts the document and the partial output
/// should be discarded.
///
/// # Errors
///
/// Returns [`EncodeError`] on sink failure, on a broken reference contract,
/// on an oversize string under [`OversizePolicy::Reject`], or when the tree is
/// deeper than `options.max_depth`.
///
/// # Examples
///
/// ```
/// use tamloxide::Tree;
/// use tamloxide::writer::{write_document, WriteOptions};
///
/// let mut tree = Tree::new();
/// let root = tree.create_element("Scene");
/// let bytes = write_document(&tree, root, Vec::new(), &WriteOptions::default()).unwrap();
/// assert!(bytes.starts_with(b"\x04Taml"));
/// ```
pub fn write_document<W: Write>(
    tree: &Tree,
    root: NodeId,
    sink: W,
    options: &WriteOptions,
) -> Result<W, EncodeError> {
    let mut header = BinaryWriter::new(sink);
    header.write_string(SIGNATURE)?;
    header.write_u32(options.version)?;
    header.write_bool(options.compressed)?;
    let sink = header.into_inner();

    debug!(
        "writing document: version {}, compressed {}",
        options.version, options.compressed
    );

    let mut encoder = Encoder::new(tree, options);
    if options.compressed {
        let mut body = BinaryWriter::new(CompressionAdapter::attach(
            sink,
            options.compression_level,
        ));
        encoder.encode(&mut body, root)?;
        let raw = body.bytes_written();
        let sink = body.into_inner().detach()?;
        log_stats(encoder.stats(), raw);
        Ok(sink)
    } else {
        let mut body = BinaryWriter::new(sink);
        encoder.encode(&mut body, root)?;
        body.flush()?;
        log_stats(encoder.stats(), body.bytes_written());
        Ok(body.into_inner())
    }
}

fn log_stats(stats: &EncodeStats, body_bytes: u64) {
    debug!(
        "wrote {} elements ({} aliases), {} custom nodes, {} body bytes before compression",
        stats.elements, stats.aliases, stats.custom_nodes, body_bytes
    );
}

/// Writes a document into a new `Vec<u8>`.
///
/// # Errors
///
/// See [`write_document`].
pub fn write_document_to_vec(
    tree: &Tree,
    root: NodeId,
    options: &WriteOptions,
) -> Result<Vec<u8>, EncodeError> {
    write_document(tree, root, Vec::with_capacity(1024), options)
}

/// Writes a document to a file, creating or truncating it.
///
/// On failure the partially written file is removed.
///
/// # Errors
///
/// See [`write_document`].
pub fn write_document_to_file(
    tree: &Tree,
    root: NodeId,
    path: impl AsRef<Path>,
    options: &WriteOptions,
) -> Result<(), EncodeError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let result = write_document(tree, root, BufWriter::new(file), options).and_then(|mut w| {
        w.flush()?;
        Ok(())
    });
    if result.is_err() {
        if let Err(e) = fs::remove_file(path) {
            warn!("could not remove partial document {}: {e}", path.display());
        }
    }
    result
}
