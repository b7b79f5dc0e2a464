//! # tamloxide
//!
//! A binary persistence format for application object hierarchies. An object
//! tree is written as a self-describing, order-sensitive byte stream: each
//! element carries its type and instance name, a flat list of attributes, its
//! children, and a secondary tree of custom nodes for structured extension
//! data. Objects reachable from more than one place are written once and
//! referenced by id everywhere else. The body can be deflated as a whole
//! without changing its logical layout.
//!
//! ## Quick Start
//!
//! ```
//! use tamloxide::{read_document, write_document, ReadOptions, Tree, WriteOptions};
//!
//! let mut tree = Tree::new();
//! let scene = tree.create_element("Scene");
//! let texture = tree.create_element("Texture");
//! tree.add_field(texture, "file", "stone.png");
//! tree.append_child(scene, texture);
//! let shared = tree.create_reference(texture);
//! tree.append_child(scene, shared);
//!
//! let bytes = write_document(&tree, scene, Vec::new(), &WriteOptions::default()).unwrap();
//! let doc = read_document(&bytes[..], &ReadOptions::default()).unwrap();
//!
//! let children = doc.tree.children(doc.root);
//! assert_eq!(doc.tree.resolve(children[1]), children[0]);
//! ```

pub mod error;
pub mod reader;
pub mod stream;
pub mod tree;
pub mod writer;

// Re-export primary types at the crate root for convenience.
pub use error::{DecodeError, EncodeError};
pub use reader::{read_document, Document, ReadOptions};
pub use tree::{CustomNodeId, NodeId, Tree};
pub use writer::{write_document, WriteOptions};
