//! Element, attribute, children and custom node encoding.
//!
//! ```text
//! Element    := TypeName:str InstanceName:str Id:u32 BackrefId:u32
//!               [ Attributes Children CustomNodes ]   // only if BackrefId == 0
//! Attributes := Count:u32 (Name:str Value:lstr)*Count
//! Children   := Count:u32 Element*Count
//! CustomNodes:= Count:u32 CustomNode*Count
//! CustomNode := Name:str IsProxy:bool
//!               IsProxy -> Element
//!               else    -> Count:u32 CustomNode*Count Count:u32 (Name:str Value:lstr)*Count
//! ```
//!
//! The walk is depth-first in exactly this order, but driven by an explicit
//! task stack instead of native recursion, so tree depth is bounded only by
//! `max_depth` and never by the thread's stack size. Each nested structure is
//! pushed in reverse so it pops in document order; a custom node's fields are
//! pushed beneath its children so they are written after them.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;

use log::{trace, warn};

use super::{OversizePolicy, WriteOptions, MAX_ATTRIBUTE_VALUE_LENGTH, MAX_NAME_LENGTH};
use crate::error::{EncodeError, FieldClass};
use crate::stream::BinaryWriter;
use crate::tree::{CustomNodeId, CustomNodeKind, Field, NodeId, Tree};

/// Counts gathered while encoding one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Elements written, aliases included.
    pub elements: usize,
    /// Elements written as backreferences.
    pub aliases: usize,
    /// Custom nodes written, proxies included.
    pub custom_nodes: usize,
    /// Strings shortened under [`OversizePolicy::Truncate`].
    pub truncated: usize,
}

enum Task {
    Element { id: NodeId, depth: u32 },
    CustomNodes { owner: NodeId, depth: u32 },
    CustomNode { id: CustomNodeId, depth: u32 },
    CustomFields(CustomNodeId),
}

pub(super) struct Encoder<'a> {
    tree: &'a Tree,
    options: &'a WriteOptions,
    /// Reference ids whose element header is already in the stream, and the
    /// element that carried each.
    emitted: HashMap<u32, NodeId>,
    stack: Vec<Task>,
    stats: EncodeStats,
}

impl<'a> Encoder<'a> {
    pub(super) fn new(tree: &'a Tree, options: &'a WriteOptions) -> Self {
        Self {
            tree,
            options,
            emitted: HashMap::new(),
            stack: Vec::new(),
            stats: EncodeStats::default(),
        }
    }

    pub(super) fn stats(&self) -> &EncodeStats {
        &self.stats
    }

    /// Encodes `root` and everything below it.
    pub(super) fn encode<W: Write>(
        &mut self,
        out: &mut BinaryWriter<W>,
        root: NodeId,
    ) -> Result<(), EncodeError> {
        self.stack.push(Task::Element { id: root, depth: 1 });
        while let Some(task) = self.stack.pop() {
            match task {
                Task::Element { id, depth } => self.element(out, id, depth)?,
                Task::CustomNodes { owner, depth } => self.custom_nodes(out, owner, depth)?,
                Task::CustomNode { id, depth } => self.custom_node(out, id, depth)?,
                Task::CustomFields(id) => self.custom_fields(out, id)?,
            }
        }
        Ok(())
    }

    fn check_depth(&self, depth: u32) -> Result<(), EncodeError> {
        if depth > self.options.max_depth {
            return Err(EncodeError::DepthLimitExceeded {
                max: self.options.max_depth,
            });
        }
        Ok(())
    }

    fn element<W: Write>(
        &mut self,
        out: &mut BinaryWriter<W>,
        id: NodeId,
        depth: u32,
    ) -> Result<(), EncodeError> {
        self.check_depth(depth)?;
        let tree = self.tree;
        let node = tree.node(id);
        trace!("element {} at depth {depth}", node.type_name);

        self.write_name(out, &node.type_name)?;
        self.write_name(out, node.instance_name.as_deref().unwrap_or(""))?;
        out.write_u32(node.ref_id)?;
        self.stats.elements += 1;

        if let Some(target) = node.ref_to {
            let target = tree.resolve(target);
            let target_id = tree.node(target).ref_id;
            if target_id == 0 {
                return Err(EncodeError::UnassignedReference {
                    type_name: node.type_name.clone(),
                });
            }
            // The id must have been written by the target itself, not by
            // another element that happens to share it.
            if self.emitted.get(&target_id) != Some(&target) {
                return Err(EncodeError::ForwardReference {
                    type_name: node.type_name.clone(),
                    ref_id: target_id,
                });
            }
            out.write_u32(target_id)?;
            self.stats.aliases += 1;
            return Ok(());
        }

        out.write_u32(0)?;
        if node.ref_id != 0 && self.emitted.insert(node.ref_id, id).is_some() {
            return Err(EncodeError::DuplicateReference {
                type_name: node.type_name.clone(),
                ref_id: node.ref_id,
            });
        }

        self.write_fields(out, &node.fields, FieldClass::Attribute)?;

        let children = tree.children(id);
        out.write_u32(count(children.len(), "child")?)?;
        self.stack.push(Task::CustomNodes { owner: id, depth });
        self.stack.extend(
            children
                .iter()
                .rev()
                .map(|&child| Task::Element { id: child, depth: depth + 1 }),
        );
        Ok(())
    }

    fn custom_nodes<W: Write>(
        &mut self,
        out: &mut BinaryWriter<W>,
        owner: NodeId,
        depth: u32,
    ) -> Result<(), EncodeError> {
        let nodes = self.tree.custom_nodes(owner);
        out.write_u32(count(nodes.len(), "custom node")?)?;
        self.stack.extend(
            nodes
                .iter()
                .rev()
                .map(|&id| Task::CustomNode { id, depth: depth + 1 }),
        );
        Ok(())
    }

    fn custom_node<W: Write>(
        &mut self,
        out: &mut BinaryWriter<W>,
        id: CustomNodeId,
        depth: u32,
    ) -> Result<(), EncodeError> {
        self.check_depth(depth)?;
        let tree = self.tree;
        let custom = tree.custom_node(id);
        self.write_name(out, &custom.name)?;
        self.stats.custom_nodes += 1;

        match &custom.kind {
            CustomNodeKind::Proxy(element) => {
                out.write_bool(true)?;
                self.stack.push(Task::Element {
                    id: *element,
                    depth: depth + 1,
                });
            }
            CustomNodeKind::Compound { children, .. } => {
                out.write_bool(false)?;
                out.write_u32(count(children.len(), "custom child")?)?;
                self.stack.push(Task::CustomFields(id));
                self.stack.extend(
                    children
                        .iter()
                        .rev()
                        .map(|&child| Task::CustomNode { id: child, depth: depth + 1 }),
                );
            }
        }
        Ok(())
    }

    fn custom_fields<W: Write>(
        &mut self,
        out: &mut BinaryWriter<W>,
        id: CustomNodeId,
    ) -> Result<(), EncodeError> {
        let tree = self.tree;
        if let CustomNodeKind::Compound { fields, .. } = &tree.custom_node(id).kind {
            self.write_fields(out, fields, FieldClass::CustomField)?;
        }
        Ok(())
    }

    fn write_fields<W: Write>(
        &mut self,
        out: &mut BinaryWriter<W>,
        fields: &[Field],
        class: FieldClass,
    ) -> Result<(), EncodeError> {
        let max = match class {
            FieldClass::CustomField => self.options.max_custom_field_length,
            _ => MAX_ATTRIBUTE_VALUE_LENGTH,
        };
        out.write_u32(count(fields.len(), "field")?)?;
        for field in fields {
            self.write_name(out, &field.name)?;
            let value = self.bounded(&field.value, &field.name, max, class)?;
            out.write_long_string(&value)?;
        }
        Ok(())
    }

    fn write_name<W: Write>(
        &mut self,
        out: &mut BinaryWriter<W>,
        name: &str,
    ) -> Result<(), EncodeError> {
        let name = self.bounded(name, name, MAX_NAME_LENGTH, FieldClass::Name)?;
        out.write_string(&name)?;
        Ok(())
    }

    /// Applies the oversize policy to `value`.
    fn bounded<'v>(
        &mut self,
        value: &'v str,
        name: &str,
        max: usize,
        class: FieldClass,
    ) -> Result<Cow<'v, str>, EncodeError> {
        if value.len() <= max {
            return Ok(Cow::Borrowed(value));
        }
        match self.options.oversize {
            OversizePolicy::Reject => Err(EncodeError::ValueTooLong {
                class,
                name: truncate_at_char_boundary(name, 64).to_string(),
                len: value.len(),
                max,
            }),
            OversizePolicy::Truncate => {
                warn!(
                    "truncating {class} `{}` from {} to {max} bytes",
                    truncate_at_char_boundary(name, 64),
                    value.len()
                );
                self.stats.truncated += 1;
                Ok(Cow::Borrowed(truncate_at_char_boundary(value, max)))
            }
        }
    }
}

fn count(len: usize, what: &'static str) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::CountOverflow { what, count: len })
}

/// Returns the longest prefix of `s` that is at most `max` bytes and ends on
/// a character boundary.
pub(crate) fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode(tree: &Tree, root: NodeId, options: &WriteOptions) -> Result<Vec<u8>, EncodeError> {
        let mut out = BinaryWriter::new(Vec::new());
        Encoder::new(tree, options).encode(&mut out, root)?;
        Ok(out.into_inner())
    }

    #[test]
    fn test_empty_element_is_three_zero_counts() {
        let mut tree = Tree::new();
        let root = tree.create_element("Ab");
        let bytes = encode(&tree, root, &WriteOptions::default()).unwrap();
        let mut expected = vec![2, b'A', b'b', 0];
        expected.extend_from_slice(&[0; 4]); // id
        expected.extend_from_slice(&[0; 4]); // no backreference
        expected.extend_from_slice(&[0; 12]); // attributes, children, custom nodes
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_absent_and_empty_children_encode_alike() {
        let mut tree = Tree::new();
        let a = tree.create_element("N");
        let b = tree.create_element("N");
        tree.node_mut(b).children = Some(Vec::new());
        let opts = WriteOptions::default();
        assert_eq!(encode(&tree, a, &opts).unwrap(), encode(&tree, b, &opts).unwrap());
    }

    #[test]
    fn test_alias_has_no_body() {
        let mut tree = Tree::new();
        let root = tree.create_element("R");
        let target = tree.create_element("T");
        tree.add_field(target, "k", "v");
        tree.append_child(root, target);
        let alias = tree.create_reference(target);
        tree.append_child(root, alias);

        let bytes = encode(&tree, root, &WriteOptions::default()).unwrap();
        // alias: "T", "", id 0, backref 1, then the root's custom node count
        let tail: Vec<u8> = [
            &[1, b'T', 0][..],
            &[0, 0, 0, 0],
            &[1, 0, 0, 0],
            &[0, 0, 0, 0],
        ]
        .concat();
        assert!(bytes.ends_with(&tail));
    }

    #[test]
    fn test_unassigned_reference_fails() {
        let mut tree = Tree::new();
        let root = tree.create_element("R");
        let target = tree.create_element("T");
        let alias = tree.create_element("T");
        tree.set_reference(alias, target);
        tree.append_child(root, target);
        tree.append_child(root, alias);
        let err = encode(&tree, root, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, EncodeError::UnassignedReference { .. }));
    }

    #[test]
    fn test_forward_reference_fails() {
        let mut tree = Tree::new();
        let root = tree.create_element("R");
        let target = tree.create_element("T");
        let alias = tree.create_reference(target);
        tree.append_child(root, alias);
        tree.append_child(root, target);
        let err = encode(&tree, root, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, EncodeError::ForwardReference { ref_id: 1, .. }));
    }

    #[test]
    fn test_same_node_twice_with_id_fails() {
        let mut tree = Tree::new();
        let root = tree.create_element("R");
        let shared = tree.create_element("S");
        tree.assign_ref_id(shared);
        tree.append_child(root, shared);
        tree.append_child(root, shared);
        let err = encode(&tree, root, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, EncodeError::DuplicateReference { ref_id: 1, .. }));
    }

    #[test]
    fn test_reference_to_unwritten_node_sharing_written_id_fails() {
        let mut tree = Tree::new();
        let root = tree.create_element("R");
        let written = tree.create_element("W");
        let target = tree.create_element("T");
        tree.set_ref_id(written, 5);
        tree.set_ref_id(target, 5);
        let alias = tree.create_element("T");
        tree.set_reference(alias, target);
        tree.append_child(root, written);
        tree.append_child(root, alias);
        tree.append_child(root, target);
        let err = encode(&tree, root, &WriteOptions::default()).unwrap_err();
        assert!(matches!(err, EncodeError::ForwardReference { ref_id: 5, .. }));
    }

    #[test]
    fn test_reference_through_alias_chain() {
        let mut tree = Tree::new();
        let root = tree.create_element("R");
        let target = tree.create_element("T");
        tree.append_child(root, target);
        let first = tree.create_reference(target);
        tree.append_child(root, first);
        let second = tree.create_element("T");
        tree.set_reference(second, first);
        tree.append_child(root, second);

        let bytes = encode(&tree, root, &WriteOptions::default()).unwrap();
        // second alias: "T", "", id 0, backref 1, then the root's custom node count
        let tail: Vec<u8> = [
            &[1, b'T', 0][..],
            &[0, 0, 0, 0],
            &[1, 0, 0, 0],
            &[0, 0, 0, 0],
        ]
        .concat();
        assert!(bytes.ends_with(&tail));
    }

    #[test]
    fn test_custom_fields_follow_children() {
        let mut tree = Tree::new();
        let root = tree.create_element("R");
        let parent = tree.create_custom_node("P");
        let child = tree.create_custom_node("C");
        tree.add_custom_field(parent, "f", "1");
        tree.append_custom_child(parent, child);
        tree.attach_custom_node(root, parent);

        let bytes = encode(&tree, root, &WriteOptions::default()).unwrap();
        let custom: Vec<u8> = [
            &[1, 0, 0, 0][..], // one custom node
            &[1, b'P', 0],     // name, not proxy
            &[1, 0, 0, 0],     // one child
            &[1, b'C', 0],     // child name, not proxy
            &[0; 8],           // child: no children, no fields
            &[1, 0, 0, 0],     // parent: one field
            &[1, b'f', 1, 0, 0, 0, b'1'],
        ]
        .concat();
        assert!(bytes.ends_with(&custom));
    }

    #[test]
    fn test_proxy_writes_element_only() {
        let mut tree = Tree::new();
        let root = tree.create_element("R");
        let wrapped = tree.create_element("W");
        let proxy = tree.create_proxy_custom_node("X", wrapped);
        tree.attach_custom_node(root, proxy);

        let bytes = encode(&tree, root, &WriteOptions::default()).unwrap();
        let tail: Vec<u8> = [
            &[1, 0, 0, 0][..],
            &[1, b'X', 1],
            &[1, b'W', 0],
            &[0; 20],
        ]
        .concat();
        assert!(bytes.ends_with(&tail));
    }

    #[test]
    fn test_attribute_at_limit_and_over() {
        let mut tree = Tree::new();
        let ok = tree.create_element("A");
        tree.add_field(ok, "v", "x".repeat(MAX_ATTRIBUTE_VALUE_LENGTH));
        assert!(encode(&tree, ok, &WriteOptions::default()).is_ok());

        let bad = tree.create_element("A");
        tree.add_field(bad, "v", "x".repeat(MAX_ATTRIBUTE_VALUE_LENGTH + 1));
        let err = encode(&tree, bad, &WriteOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::ValueTooLong {
                class: FieldClass::Attribute,
                len: 4097,
                max: 4096,
                ..
            }
        ));
    }

    #[test]
    fn test_truncate_policy() {
        let mut tree = Tree::new();
        let el = tree.create_element("A");
        tree.add_field(el, "v", "x".repeat(MAX_ATTRIBUTE_VALUE_LENGTH + 10));
        let opts = WriteOptions::default().oversize(OversizePolicy::Truncate);
        let mut out = BinaryWriter::new(Vec::new());
        let mut encoder = Encoder::new(&tree, &opts);
        encoder.encode(&mut out, el).unwrap();
        assert_eq!(encoder.stats().truncated, 1);
        let bytes = out.into_inner();
        // "A", "", id, backref, count 1, "v", then the value length prefix
        assert_eq!(&bytes[17..21], &4096u32.to_le_bytes());
    }

    #[test]
    fn test_custom_field_limit_is_configurable() {
        let mut tree = Tree::new();
        let el = tree.create_element("A");
        let c = tree.create_custom_node("C");
        tree.add_custom_field(c, "v", "x".repeat(100));
        tree.attach_custom_node(el, c);
        let opts = WriteOptions::default().max_custom_field_length(99);
        let err = encode(&tree, el, &opts).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::ValueTooLong {
                class: FieldClass::CustomField,
                ..
            }
        ));
        let opts = WriteOptions::default().max_custom_field_length(100);
        assert!(encode(&tree, el, &opts).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let mut tree = Tree::new();
        let root = tree.create_element("L");
        let mut parent = root;
        for _ in 0..4 {
            let child = tree.create_element("L");
            tree.append_child(parent, child);
            parent = child;
        }
        // five levels
        assert!(encode(&tree, root, &WriteOptions::default().max_depth(5)).is_ok());
        let err = encode(&tree, root, &WriteOptions::default().max_depth(4)).unwrap_err();
        assert!(matches!(err, EncodeError::DepthLimitExceeded { max: 4 }));
    }

    #[test]
    fn test_truncate_at_char_boundary() {
        assert_eq!(truncate_at_char_boundary("héllo", 2), "h");
        assert_eq!(truncate_at_char_boundary("héllo", 3), "hé");
        assert_eq!(truncate_at_char_boundary("abc", 10), "abc");
    }
}
