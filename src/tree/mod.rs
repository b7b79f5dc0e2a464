//! Arena-based object tree.
//!
//! All elements live in a `Vec<NodeData>` and all custom nodes in a
//! `Vec<CustomNodeData>`, both owned by the `Tree`. They are referenced by
//! `NodeId` and `CustomNodeId`, newtypes over `NonZeroU32`.
//!
//! Shared objects are not expressed through pointer identity. The first
//! occurrence of an object is an ordinary element; every later occurrence is
//! an alias element whose `ref_to` names the first one by index. The target
//! gets a nonzero reference id from the tree's counter, and that id is what
//! travels on the wire.

mod node;

pub use node::{CustomNodeData, CustomNodeKind, Field, NodeData};

use std::collections::HashSet;
use std::fmt::Write as _;
use std::num::NonZeroU32;

/// A typed index into the tree's element arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(NonZeroU32);

/// A typed index into the tree's custom node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CustomNodeId(NonZeroU32);

macro_rules! arena_index {
    ($ty:ident) => {
        impl $ty {
            #[allow(clippy::expect_used, clippy::cast_possible_truncation)]
            fn from_index(index: usize) -> Self {
                Self(NonZeroU32::new(index as u32 + 1).expect("arena index overflow"))
            }

            fn as_index(self) -> usize {
                self.0.get() as usize - 1
            }

            /// Converts this id to a raw `u32`. Always non-zero.
            #[must_use]
            pub fn into_raw(self) -> u32 {
                self.0.get()
            }

            /// Creates an id from a raw `u32`, if non-zero.
            #[must_use]
            pub fn from_raw(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }
        }
    };
}

arena_index!(NodeId);
arena_index!(CustomNodeId);

/// An object tree ready to be encoded, or freshly decoded.
///
/// # Examples
///
/// ```
/// use tamloxide::Tree;
///
/// let mut tree = Tree::new();
/// let scene = tree.create_element("Scene");
/// let image = tree.create_element("ImageAsset");
/// tree.add_field(image, "file", "ship.png");
/// tree.append_child(scene, image);
///
/// // A second occurrence of the same asset becomes an alias.
/// let alias = tree.create_reference(image);
/// tree.append_child(scene, alias);
///
/// assert_eq!(tree.resolve(alias), image);
/// assert_eq!(tree.node(image).ref_id, 1);
/// ```
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeData>,
    custom_nodes: Vec<CustomNodeData>,
    /// Where the search for a free reference id starts.
    next_ref_id: u32,
    /// Every reference id handed out or set, so none is handed out twice.
    taken_ref_ids: HashSet<u32>,
}

impl Tree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(64),
            custom_nodes: Vec::new(),
            next_ref_id: 1,
            taken_ref_ids: HashSet::new(),
        }
    }

    // --- Access ---

    /// Returns the data for an element.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.as_index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.as_index()]
    }

    /// Returns the data for a custom node.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    #[must_use]
    pub fn custom_node(&self, id: CustomNodeId) -> &CustomNodeData {
        &self.custom_nodes[id.as_index()]
    }

    pub(crate) fn custom_node_mut(&mut self, id: CustomNodeId) -> &mut CustomNodeData {
        &mut self.custom_nodes[id.as_index()]
    }

    /// Returns the child elements of a node. Empty for a node without a
    /// children container.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).children.as_deref().unwrap_or(&[])
    }

    /// Returns the attributes of a node.
    #[must_use]
    pub fn fields(&self, id: NodeId) -> &[Field] {
        &self.node(id).fields
    }

    /// Returns the value of the first attribute called `name`.
    #[must_use]
    pub fn field(&self, id: NodeId, name: &str) -> Option<&str> {
        self.fields(id)
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Returns the custom nodes attached to an element.
    #[must_use]
    pub fn custom_nodes(&self, id: NodeId) -> &[CustomNodeId] {
        &self.node(id).custom_nodes
    }

    /// Follows alias links until reaching a node that is not an alias.
    #[must_use]
    pub fn resolve(&self, mut id: NodeId) -> NodeId {
        // A chain can be at most as long as the arena.
        for _ in 0..self.nodes.len() {
            match self.node(id).ref_to {
                Some(target) => id = target,
                None => break,
            }
        }
        id
    }

    /// Returns the element that carries the given reference id.
    #[must_use]
    pub fn find_by_ref_id(&self, ref_id: u32) -> Option<NodeId> {
        if ref_id == 0 {
            return None;
        }
        self.nodes
            .iter()
            .position(|n| n.ref_id == ref_id && n.ref_to.is_none())
            .map(NodeId::from_index)
    }

    /// Returns the number of elements in the arena.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of custom nodes in the arena.
    #[must_use]
    pub fn custom_node_count(&self) -> usize {
        self.custom_nodes.len()
    }

    /// Returns an iterator over every element id in allocation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::from_index)
    }

    /// Returns an iterator over every custom node id in allocation order.
    pub fn custom_node_ids(&self) -> impl Iterator<Item = CustomNodeId> + '_ {
        (0..self.custom_nodes.len()).map(CustomNodeId::from_index)
    }

    /// Returns an iterator over a node and all of its descendant elements,
    /// depth-first in document order.
    ///
    /// Only the children containers are walked; elements reachable through
    /// proxy custom nodes are not visited. A child that is already on the
    /// path from `id` is skipped, so a cyclic tree still terminates.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![(id, 0)],
            path: Vec::new(),
        }
    }

    // --- Building ---

    /// Allocates a new element and returns its id.
    pub fn create_element(&mut self, type_name: impl Into<String>) -> NodeId {
        let index = self.nodes.len();
        self.nodes.push(NodeData::new(type_name.into()));
        NodeId::from_index(index)
    }

    /// Sets an element's instance name.
    pub fn set_instance_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.node_mut(id).instance_name = Some(name.into());
    }

    /// Appends an attribute to an element.
    pub fn add_field(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        self.node_mut(id).fields.push(Field::new(name, value));
    }

    /// Appends a child element, creating the children container on first use.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(parent)
            .children
            .get_or_insert_with(Vec::new)
            .push(child);
    }

    /// Gives a node a reference id if it does not have one yet, and returns
    /// the id.
    ///
    /// New ids count up from the highest one seen so far, skip ids already in
    /// use, and wrap from `u32::MAX` back to 1. Zero is never handed out.
    ///
    /// # Panics
    ///
    /// Panics if every nonzero `u32` is already in use.
    pub fn assign_ref_id(&mut self, id: NodeId) -> u32 {
        if self.node(id).ref_id == 0 {
            let ref_id = self.allocate_ref_id();
            self.node_mut(id).ref_id = ref_id;
        }
        self.node(id).ref_id
    }

    fn allocate_ref_id(&mut self) -> u32 {
        let mut candidate = self.next_ref_id;
        for _ in 0..u32::MAX {
            if candidate == 0 {
                candidate = 1;
            }
            if self.taken_ref_ids.insert(candidate) {
                self.next_ref_id = candidate.wrapping_add(1);
                return candidate;
            }
            candidate = candidate.wrapping_add(1);
        }
        panic!("reference id space exhausted");
    }

    /// Creates an alias of `target`.
    ///
    /// The alias copies the target's type and instance name, so it reads the
    /// same on the wire header, and the target is given a reference id if it
    /// lacks one. If `target` is itself an alias, the new alias points at the
    /// original.
    pub fn create_reference(&mut self, target: NodeId) -> NodeId {
        let target = self.resolve(target);
        self.assign_ref_id(target);
        let data = self.node(target);
        let type_name = data.type_name.clone();
        let instance_name = data.instance_name.clone();
        let alias = self.create_element(type_name);
        let node = self.node_mut(alias);
        node.instance_name = instance_name;
        node.ref_to = Some(target);
        alias
    }

    /// Marks `alias` as referring to `target` without touching reference ids.
    ///
    /// For producers that manage ids themselves. The writer rejects the tree
    /// if `target` still has no id when `alias` is encoded.
    pub fn set_reference(&mut self, alias: NodeId, target: NodeId) {
        self.node_mut(alias).ref_to = Some(target);
    }

    /// Sets an element's reference id directly.
    ///
    /// The id is reserved so [`assign_ref_id`](Self::assign_ref_id) never
    /// hands it out again. Giving two elements the same id is not checked
    /// here; the writer rejects such a tree.
    pub fn set_ref_id(&mut self, id: NodeId, ref_id: u32) {
        self.node_mut(id).ref_id = ref_id;
        if ref_id != 0 {
            self.taken_ref_ids.insert(ref_id);
            if ref_id >= self.next_ref_id {
                self.next_ref_id = ref_id.wrapping_add(1);
            }
        }
    }

    /// Allocates a compound custom node with no children or fields.
    pub fn create_custom_node(&mut self, name: impl Into<String>) -> CustomNodeId {
        self.push_custom(CustomNodeData {
            name: name.into(),
            kind: CustomNodeKind::Compound {
                children: Vec::new(),
                fields: Vec::new(),
            },
        })
    }

    /// Allocates a proxy custom node wrapping `element`.
    pub fn create_proxy_custom_node(
        &mut self,
        name: impl Into<String>,
        element: NodeId,
    ) -> CustomNodeId {
        self.push_custom(CustomNodeData {
            name: name.into(),
            kind: CustomNodeKind::Proxy(element),
        })
    }

    fn push_custom(&mut self, data: CustomNodeData) -> CustomNodeId {
        let index = self.custom_nodes.len();
        self.custom_nodes.push(data);
        CustomNodeId::from_index(index)
    }

    /// Attaches a custom node to an element.
    pub fn attach_custom_node(&mut self, element: NodeId, custom: CustomNodeId) {
        self.node_mut(element).custom_nodes.push(custom);
    }

    /// Appends a child custom node.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is a proxy custom node.
    pub fn append_custom_child(&mut self, parent: CustomNodeId, child: CustomNodeId) {
        match &mut self.custom_node_mut(parent).kind {
            CustomNodeKind::Compound { children, .. } => children.push(child),
            CustomNodeKind::Proxy(_) => panic!("proxy custom nodes cannot have children"),
        }
    }

    /// Appends a field to a custom node.
    ///
    /// # Panics
    ///
    /// Panics if `custom` is a proxy custom node.
    pub fn add_custom_field(
        &mut self,
        custom: CustomNodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        match &mut self.custom_node_mut(custom).kind {
            CustomNodeKind::Compound { fields, .. } => fields.push(Field::new(name, value)),
            CustomNodeKind::Proxy(_) => panic!("proxy custom nodes cannot have fields"),
        }
    }

    // --- Debugging ---

    /// Renders an indented listing of the subtree rooted at `root`.
    ///
    /// Aliases print as `-> #id`, custom nodes are prefixed with `%`, and
    /// proxy custom nodes list their wrapped element beneath them. A node
    /// that reappears below itself prints once more with `(cycle)` and is
    /// not expanded again.
    #[must_use]
    pub fn debug_dump(&self, root: NodeId) -> String {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Item {
            Element(NodeId),
            Custom(CustomNodeId),
        }

        let mut out = String::new();
        let mut stack = vec![(Item::Element(root), 0usize)];
        // Items from the root down to the one being printed, indexed by depth.
        let mut path: Vec<Item> = Vec::new();
        while let Some((item, depth)) = stack.pop() {
            path.truncate(depth);
            let cycle = path.contains(&item);
            path.push(item);
            let pad = "  ".repeat(depth);
            match item {
                Item::Element(id) => {
                    let node = self.node(id);
                    let _ = write!(out, "{pad}{}", node.type_name);
                    if let Some(name) = node.instance_name.as_deref().filter(|n| !n.is_empty()) {
                        let _ = write!(out, " \"{name}\"");
                    }
                    if node.ref_id != 0 {
                        let _ = write!(out, " #{}", node.ref_id);
                    }
                    if let Some(target) = node.ref_to {
                        let _ = writeln!(out, " -> #{}", self.node(target).ref_id);
                        continue;
                    }
                    if cycle {
                        out.push_str(" (cycle)\n");
                        continue;
                    }
                    out.push('\n');
                    for field in &node.fields {
                        let _ = writeln!(out, "{pad}  @{} = {:?}", field.name, field.value);
                    }
                    for &custom in node.custom_nodes.iter().rev() {
                        stack.push((Item::Custom(custom), depth + 1));
                    }
                    for &child in self.children(id).iter().rev() {
                        stack.push((Item::Element(child), depth + 1));
                    }
                }
                Item::Custom(id) => {
                    let custom = self.custom_node(id);
                    if cycle {
                        let _ = writeln!(out, "{pad}%{} (cycle)", custom.name);
                        continue;
                    }
                    let _ = writeln!(out, "{pad}%{}", custom.name);
                    match &custom.kind {
                        CustomNodeKind::Proxy(element) => {
                            stack.push((Item::Element(*element), depth + 1));
                        }
                        CustomNodeKind::Compound { children, fields } => {
                            for field in fields {
                                let _ = writeln!(out, "{pad}  @{} = {:?}", field.name, field.value);
                            }
                            for &child in children.iter().rev() {
                                stack.push((Item::Custom(child), depth + 1));
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

// --- Iterators ---

/// Depth-first iterator over an element and its descendants.
pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<(NodeId, usize)>,
    /// Nodes from the starting node down to the last one yielded.
    path: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let (current, depth) = self.stack.pop()?;
        self.path.truncate(depth);
        self.path.push(current);
        let path = &self.path;
        self.stack.extend(
            self.tree
                .children(current)
                .iter()
                .rev()
                .filter(|child| !path.contains(child))
                .map(|&child| (child, depth + 1)),
        );
        Some(current)
    }
}
