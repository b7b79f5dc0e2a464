//! Error types for encoding and decoding binary documents.
//!
//! Encoding can fail for three broad reasons: the underlying sink fails, the
//! tree breaks the reference contract (an alias whose target was never given
//! an id), or a value exceeds the maximum length for its field class. Decoding
//! adds the usual malformed-input cases. Every error aborts the whole
//! document; there is no partial success.

use std::fmt;
use std::io;

use thiserror::Error;

/// The class of a bounded string on the wire.
///
/// Each class has its own maximum length. Names are short strings with a
/// one-byte length prefix; values carry a four-byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldClass {
    /// A type, instance, field or custom node name.
    Name,
    /// An attribute value on an element.
    Attribute,
    /// A field value on a custom node.
    CustomField,
}

impl fmt::Display for FieldClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Attribute => write!(f, "attribute value"),
            Self::CustomField => write!(f, "custom field value"),
        }
    }
}

/// The error type returned when writing a document fails.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The underlying sink (or the compression adapter) failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An alias node points at a target that has no reference id.
    ///
    /// This is a bug in whatever built the tree: the id must be assigned
    /// before the alias is encoded.
    #[error("node `{type_name}` references a target with no assigned reference id")]
    UnassignedReference {
        /// Type name of the alias node.
        type_name: String,
    },

    /// An alias node refers to an id that has not been emitted yet.
    #[error("node `{type_name}` references id {ref_id} before it was written")]
    ForwardReference {
        /// Type name of the alias node.
        type_name: String,
        /// The reference id that was not yet in the stream.
        ref_id: u32,
    },

    /// The same element was written twice with the same reference id.
    ///
    /// A node reachable from two places must be written once and aliased
    /// everywhere else.
    #[error("node `{type_name}` with reference id {ref_id} written twice")]
    DuplicateReference {
        /// Type name of the repeated node.
        type_name: String,
        /// The repeated reference id.
        ref_id: u32,
    },

    /// A value is longer than its field class allows and the policy is
    /// [`OversizePolicy::Reject`](crate::writer::OversizePolicy::Reject).
    #[error("{class} `{name}` is {len} bytes, maximum is {max}")]
    ValueTooLong {
        /// Which kind of string overflowed.
        class: FieldClass,
        /// The field (or node) name the value belongs to.
        name: String,
        /// Actual length in bytes.
        len: usize,
        /// Allowed maximum in bytes.
        max: usize,
    },

    /// The tree is nested deeper than the configured limit.
    #[error("maximum nesting depth exceeded ({max})")]
    DepthLimitExceeded {
        /// The configured limit.
        max: u32,
    },

    /// More items in a container than a `u32` count can carry.
    #[error("{what} count {count} does not fit in a u32")]
    CountOverflow {
        /// What was being counted.
        what: &'static str,
        /// The actual count.
        count: usize,
    },
}

/// What went wrong while decoding, without position information.
#[derive(Debug, Error)]
pub enum DecodeErrorKind {
    /// The underlying source (or the decompressor) failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The document does not start with the format signature.
    #[error("bad signature `{0}`")]
    BadSignature(String),

    /// The version tag is not one this reader accepts.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A string was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A value is longer than its field class allows.
    #[error("{class} is {len} bytes, maximum is {max}")]
    ValueTooLong {
        /// Which kind of string overflowed.
        class: FieldClass,
        /// Declared length in bytes.
        len: usize,
        /// Allowed maximum in bytes.
        max: usize,
    },

    /// A backreference id was never defined earlier in the stream.
    #[error("backreference to unknown id {0}")]
    UnknownReference(u32),

    /// Two elements declared the same reference id.
    #[error("reference id {0} defined twice")]
    DuplicateReference(u32),

    /// The document is nested deeper than the configured limit.
    #[error("maximum nesting depth exceeded ({0})")]
    DepthLimitExceeded(u32),

    /// Bytes remain after the root element.
    #[error("trailing data after root element")]
    TrailingData,
}

/// The error type returned when reading a document fails.
///
/// Carries the byte offset into the (decompressed) body where decoding
/// stopped, or into the header if the header itself was bad.
#[derive(Debug, Error)]
#[error("decode error at byte {offset}: {kind}")]
pub struct DecodeError {
    /// What went wrong.
    #[source]
    pub kind: DecodeErrorKind,
    /// Offset of the failing read, counted from the start of the section
    /// being read (header or body).
    pub offset: u64,
}

impl DecodeError {
    pub(crate) fn new(kind: DecodeErrorKind, offset: u64) -> Self {
        Self { kind, offset }
    }
}
