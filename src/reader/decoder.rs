//! Worklist decoder for the element and custom node grammar.
//!
//! Counted sequences are kept on the stack as a single task with a
//! remaining count rather than one task per item, so the stack holds one
//! entry per open container and a bogus count of four billion costs nothing
//! until the items fail to appear.

use std::collections::HashMap;
use std::io::Read;

use log::trace;

use super::ReadOptions;
use crate::error::{DecodeError, DecodeErrorKind, FieldClass};
use crate::stream::BinaryReader;
use crate::tree::{CustomNodeId, NodeId, Tree};
use crate::writer::MAX_ATTRIBUTE_VALUE_LENGTH;

/// Where a decoded element goes.
enum Slot {
    Root,
    Child(NodeId),
    /// The element wrapped by a proxy custom node, which is created once the
    /// element exists.
    Proxy { name: String, owner: CustomSlot },
}

/// Where a decoded custom node goes.
enum CustomSlot {
    Element(NodeId),
    Child(CustomNodeId),
}

enum Task {
    Element { slot: Slot, depth: u32 },
    Children { parent: NodeId, remaining: u32, depth: u32 },
    CustomNodeCount { owner: NodeId, depth: u32 },
    CustomNodes { owner: NodeId, remaining: u32, depth: u32 },
    CustomNode { slot: CustomSlot, depth: u32 },
    CustomChildren { parent: CustomNodeId, remaining: u32, depth: u32 },
    CustomFields(CustomNodeId),
}

pub(super) struct Decoder<'a> {
    options: &'a ReadOptions,
    tree: Tree,
    root: Option<NodeId>,
    /// Reference id to the element that declared it.
    ids: HashMap<u32, NodeId>,
    stack: Vec<Task>,
}

impl<'a> Decoder<'a> {
    pub(super) fn new(options: &'a ReadOptions) -> Self {
        Self {
            options,
            tree: Tree::new(),
            root: None,
            ids: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Decodes one root element and everything below it.
    pub(super) fn decode<R: Read>(
        mut self,
        input: &mut BinaryReader<R>,
    ) -> Result<(Tree, NodeId), DecodeError> {
        self.stack.push(Task::Element {
            slot: Slot::Root,
            depth: 1,
        });
        while let Some(task) = self.stack.pop() {
            match task {
                Task::Element { slot, depth } => self.element(input, slot, depth)?,
                Task::Children {
                    parent,
                    remaining,
                    depth,
                } => {
                    if remaining > 0 {
                        self.stack.push(Task::Children {
                            parent,
                            remaining: remaining - 1,
                            depth,
                        });
                        self.stack.push(Task::Element {
                            slot: Slot::Child(parent),
                            depth,
                        });
                    }
                }
                Task::CustomNodeCount { owner, depth } => {
                    let remaining = input.read_u32()?;
                    self.stack.push(Task::CustomNodes {
                        owner,
                        remaining,
                        depth,
                    });
                }
                Task::CustomNodes {
                    owner,
                    remaining,
                    depth,
                } => {
                    if remaining > 0 {
                        self.stack.push(Task::CustomNodes {
                            owner,
                            remaining: remaining - 1,
                            depth,
                        });
                        self.stack.push(Task::CustomNode {
                            slot: CustomSlot::Element(owner),
                            depth,
                        });
                    }
                }
                Task::CustomNode { slot, depth } => self.custom_node(input, slot, depth)?,
                Task::CustomChildren {
                    parent,
                    remaining,
                    depth,
                } => {
                    if remaining > 0 {
                        self.stack.push(Task::CustomChildren {
                            parent,
                            remaining: remaining - 1,
                            depth,
                        });
                        self.stack.push(Task::CustomNode {
                            slot: CustomSlot::Child(parent),
                            depth,
                        });
                    }
                }
                Task::CustomFields(id) => self.custom_fields(input, id)?,
            }
        }

        match self.root {
            Some(root) => Ok((self.tree, root)),
            // The root task always produces a node or an error.
            None => Err(input.error(DecodeErrorKind::UnexpectedEof)),
        }
    }

    fn check_depth<R: Read>(&self, input: &BinaryReader<R>, depth: u32) -> Result<(), DecodeError> {
        if depth > self.options.max_depth {
            return Err(input.error(DecodeErrorKind::DepthLimitExceeded(self.options.max_depth)));
        }
        Ok(())
    }

    fn element<R: Read>(
        &mut self,
        input: &mut BinaryReader<R>,
        slot: Slot,
        depth: u32,
    ) -> Result<(), DecodeError> {
        self.check_depth(input, depth)?;
        let type_name = input.read_string()?;
        let instance_name = input.read_string()?;
        let id_offset = input.position();
        let ref_id = input.read_u32()?;
        let backref_offset = input.position();
        let backref = input.read_u32()?;
        trace!("element {type_name} at depth {depth}");

        let id = self.tree.create_element(type_name);
        if !instance_name.is_empty() {
            self.tree.set_instance_name(id, instance_name);
        }
        self.place(slot, id);

        if backref != 0 {
            let target = *self.ids.get(&backref).ok_or_else(|| {
                DecodeError::new(DecodeErrorKind::UnknownReference(backref), backref_offset)
            })?;
            let node = self.tree.node_mut(id);
            node.ref_id = ref_id;
            node.ref_to = Some(target);
            return Ok(());
        }

        if ref_id != 0 {
            if self.ids.insert(ref_id, id).is_some() {
                return Err(DecodeError::new(
                    DecodeErrorKind::DuplicateReference(ref_id),
                    id_offset,
                ));
            }
            self.tree.set_ref_id(id, ref_id);
        }

        let field_count = input.read_u32()?;
        for _ in 0..field_count {
            let name = input.read_string()?;
            let value = input.read_long_string(MAX_ATTRIBUTE_VALUE_LENGTH, FieldClass::Attribute)?;
            self.tree.add_field(id, name, value);
        }

        let child_count = input.read_u32()?;
        self.tree.node_mut(id).children = Some(Vec::new());
        self.stack.push(Task::CustomNodeCount {
            owner: id,
            depth: depth + 1,
        });
        self.stack.push(Task::Children {
            parent: id,
            remaining: child_count,
            depth: depth + 1,
        });
        Ok(())
    }

    fn place(&mut self, slot: Slot, id: NodeId) {
        match slot {
            Slot::Root => self.root = Some(id),
            Slot::Child(parent) => self.tree.append_child(parent, id),
            Slot::Proxy { name, owner } => {
                let custom = self.tree.create_proxy_custom_node(name, id);
                self.place_custom(owner, custom);
            }
        }
    }

    fn place_custom(&mut self, slot: CustomSlot, id: CustomNodeId) {
        match slot {
            CustomSlot::Element(owner) => self.tree.attach_custom_node(owner, id),
            CustomSlot::Child(parent) => self.tree.append_custom_child(parent, id),
        }
    }

    fn custom_node<R: Read>(
        &mut self,
        input: &mut BinaryReader<R>,
        slot: CustomSlot,
        depth: u32,
    ) -> Result<(), DecodeError> {
        self.check_depth(input, depth)?;
        let name = input.read_string()?;
        if input.read_bool()? {
            self.stack.push(Task::Element {
                slot: Slot::Proxy { name, owner: slot },
                depth: depth + 1,
            });
            return Ok(());
        }

        let id = self.tree.create_custom_node(name);
        self.place_custom(slot, id);
        let child_count = input.read_u32()?;
        self.stack.push(Task::CustomFields(id));
        self.stack.push(Task::CustomChildren {
            parent: id,
            remaining: child_count,
            depth: depth + 1,
        });
        Ok(())
    }

    fn custom_fields<R: Read>(
        &mut self,
        input: &mut BinaryReader<R>,
        id: CustomNodeId,
    ) -> Result<(), DecodeError> {
        let count = input.read_u32()?;
        for _ in 0..count {
            let name = input.read_string()?;
            let value =
                input.read_long_string(self.options.max_custom_field_length, FieldClass::CustomField)?;
            self.tree.add_custom_field(id, name, value);
        }
        Ok(())
    }
}
