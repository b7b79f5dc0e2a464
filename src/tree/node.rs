//! Node type definitions.
//!
//! `NodeData` is one object instance in the primary tree. `CustomNodeData` is
//! one node of the secondary extension tree hanging off an element; its
//! `CustomNodeKind` says whether it is a proxy for an ordinary element or a
//! compound node with its own children and fields.

use super::{CustomNodeId, NodeId};

/// A name/value pair on an element or a custom node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// The field name.
    pub name: String,
    /// The field value, already stringified by the producer.
    pub value: String,
}

impl Field {
    /// Creates a field from anything string-like.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Storage for a single element in the tree arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// The object's type (class) name.
    pub type_name: String,
    /// The object's instance name, if it has one.
    ///
    /// On the wire `None` and `Some("")` are the same empty string.
    pub instance_name: Option<String>,
    /// Reference id, or 0 if none has been assigned.
    pub ref_id: u32,
    /// When set, this node is an alias of an earlier node and has no body.
    pub ref_to: Option<NodeId>,
    /// Attributes in order.
    pub fields: Vec<Field>,
    /// Child elements in order. `None` and an empty vector encode identically.
    pub children: Option<Vec<NodeId>>,
    /// Custom nodes attached to this element, in order.
    pub custom_nodes: Vec<CustomNodeId>,
}

impl NodeData {
    pub(super) fn new(type_name: String) -> Self {
        Self {
            type_name,
            instance_name: None,
            ref_id: 0,
            ref_to: None,
            fields: Vec::new(),
            children: None,
            custom_nodes: Vec::new(),
        }
    }

    /// Returns `true` if this node is an alias of another node.
    #[must_use]
    pub fn is_alias(&self) -> bool {
        self.ref_to.is_some()
    }
}

/// What a custom node carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomNodeKind {
    /// Wraps an ordinary element, spliced in place of children and fields.
    ///
    /// The element is referenced, not owned: it lives in the same arena and
    /// is encoded in full wherever the proxy appears.
    Proxy(NodeId),
    /// A node of the extension tree proper.
    Compound {
        /// Child custom nodes in order.
        children: Vec<CustomNodeId>,
        /// Fields in order.
        fields: Vec<Field>,
    },
}

/// Storage for a single custom node in the tree arena.
#[derive(Debug, Clone)]
pub struct CustomNodeData {
    /// The custom node name.
    pub name: String,
    /// Proxy or compound payload.
    pub kind: CustomNodeKind,
}

impl CustomNodeData {
    /// Returns `true` for a proxy custom node.
    #[must_use]
    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, CustomNodeKind::Proxy(_))
    }
}
