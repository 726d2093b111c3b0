//! Node tree for the Kestrel pipeline.
//!
//! This crate provides an arena-based tree of elements and text following the
//! shape of the [DOM Living Standard](https://dom.spec.whatwg.org/).
//!
//! # Design
//!
//! The tree uses arena allocation with [`NodeId`] indices for all relationships.
//! A parent owns its ordered child list; the child's parent link is a plain
//! index, so the tree never holds a reference cycle.
//!
//! Handles are generation-checked. Releasing a subtree bumps the generation of
//! every freed slot, so a [`NodeId`] captured by a timer or script callback
//! before the release can never resolve to whatever node reuses the slot.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Map of attribute names to values for an element.
pub type AttributesMap = HashMap<String, String>;

/// Map of CSS property names to declared or resolved values.
pub type PropertyMap = HashMap<String, String>;

/// A type-safe, generation-checked index into the node tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// The root element is always the first slot and is never released.
    pub const ROOT: Self = Self {
        index: 0,
        generation: 0,
    };

    /// Position of the node's slot in the arena.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// How many times the slot had been released when this handle was made.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// A node in the tree.
///
/// [§ 4.4 Interface Node](https://dom.spec.whatwg.org/#interface-node)
///
/// "An object that participates in a tree has a parent, which is either
/// null or an object, and has children, which is an ordered set of objects."
#[derive(Debug, Clone)]
pub struct Node {
    /// Element or text payload.
    pub data: NodeData,

    /// Non-owning link to the parent, `None` for the root and detached nodes.
    pub parent: Option<NodeId>,

    /// Owned children in document order.
    pub children: Vec<NodeId>,
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// [§ 4.9 Interface Element](https://dom.spec.whatwg.org/#interface-element)
    Element(ElementData),
    /// [§ 4.10 Interface Text](https://dom.spec.whatwg.org/#interface-text)
    Text(String),
}

/// Element-specific data.
///
/// NOTE: Only the local name is stored. Namespaces are out of scope.
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    /// "An element's local name"
    pub tag_name: String,
    /// "An element has an associated attribute list"
    pub attrs: AttributesMap,
    /// Declarations from the element's own `style` attribute, already parsed.
    pub inline_style: PropertyMap,
    /// Whether this element currently has focus.
    pub focused: bool,
}

impl ElementData {
    /// Create element data with no attributes.
    #[must_use]
    pub fn new(tag_name: &str) -> Self {
        Self {
            tag_name: tag_name.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Value of an attribute, if present.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// A detached subtree as produced by the markup parser collaborator.
///
/// Used both to build whole documents and to replace an element's content
/// (the `innerHTML` path). Deserializes from JSON: a string is a text node, an
/// object is an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fragment {
    /// A text node.
    Text(String),
    /// An element with its attributes, inline style and children.
    Element {
        /// Tag name.
        tag: String,
        /// Attributes other than `style`.
        #[serde(default)]
        attributes: AttributesMap,
        /// Parsed inline style declarations.
        #[serde(default)]
        style: PropertyMap,
        /// Children in document order.
        #[serde(default)]
        children: Vec<Fragment>,
    },
}

impl Fragment {
    /// Convenience constructor for an element fragment.
    #[must_use]
    pub fn element(tag: &str, children: Vec<Self>) -> Self {
        Self::Element {
            tag: tag.to_string(),
            attributes: AttributesMap::new(),
            style: PropertyMap::new(),
            children,
        }
    }

    /// Convenience constructor for a text fragment.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-based node tree with O(1) node access.
///
/// [§ 4 Nodes](https://dom.spec.whatwg.org/#nodes)
///
/// Slot 0 always holds the root element. Freed slots are recycled with a new
/// generation.
#[derive(Debug, Clone)]
pub struct DomTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl DomTree {
    /// Create a tree holding just an empty `<html>` root element.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(ElementData::new("html"))
    }

    /// Create a tree whose root element carries `data`.
    #[must_use]
    pub fn with_root(data: ElementData) -> Self {
        let root = Node {
            data: NodeData::Element(data),
            parent: None,
            children: Vec::new(),
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root),
            }],
            free: Vec::new(),
        }
    }

    /// Build a tree from a parsed fragment. A text fragment is wrapped in an
    /// `<html>` root.
    #[must_use]
    pub fn from_fragment(fragment: &Fragment) -> Self {
        match fragment {
            Fragment::Text(_) => {
                let mut tree = Self::new();
                let child = tree.instantiate(fragment);
                tree.append_child(NodeId::ROOT, child);
                tree
            }
            Fragment::Element {
                tag,
                attributes,
                style,
                children,
            } => {
                let mut data = ElementData::new(tag);
                data.attrs.clone_from(attributes);
                data.inline_style.clone_from(style);
                let mut tree = Self::with_root(data);
                for child in children {
                    let id = tree.instantiate(child);
                    tree.append_child(NodeId::ROOT, id);
                }
                tree
            }
        }
    }

    /// Get the root element ID.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Whether `id` still refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Get a node by its ID. Stale handles resolve to `None`.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    /// Get a mutable reference to a node by its ID.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// A tree always has its root, so this is never true.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a new detached node and return its ID.
    pub fn alloc(&mut self, data: NodeData) -> NodeId {
        let node = Node {
            data,
            parent: None,
            children: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            #[allow(clippy::cast_possible_truncation)]
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Allocate the nodes of a fragment as a detached subtree.
    pub fn instantiate(&mut self, fragment: &Fragment) -> NodeId {
        match fragment {
            Fragment::Text(text) => self.alloc(NodeData::Text(text.clone())),
            Fragment::Element {
                tag,
                attributes,
                style,
                children,
            } => {
                let mut data = ElementData::new(tag);
                data.attrs.clone_from(attributes);
                data.inline_style.clone_from(style);
                let id = self.alloc(NodeData::Element(data));
                for child in children {
                    let child_id = self.instantiate(child);
                    self.append_child(id, child_id);
                }
                id
            }
        }
    }

    /// [§ 4.2.2 Append](https://dom.spec.whatwg.org/#concept-node-append)
    ///
    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous parent first. Stale handles are ignored.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return;
        }
        if self.is_inclusive_ancestor(child, parent) {
            // Appending an ancestor under its own descendant would form a cycle.
            return;
        }
        self.detach(child);
        if let Some(node) = self.get_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
    }

    /// [§ 4.2.3 Remove](https://dom.spec.whatwg.org/#concept-node-remove)
    ///
    /// Detach `child` from `parent` without freeing it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if self.parent(child) == Some(parent) {
            self.detach(child);
        }
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(node) = self.get_mut(parent) {
            node.children.retain(|&c| c != child);
        }
        if let Some(node) = self.get_mut(child) {
            node.parent = None;
        }
    }

    /// Detach a subtree and free all of its slots. Every handle into the
    /// subtree becomes stale. The root cannot be released.
    pub fn release(&mut self, id: NodeId) {
        if id == NodeId::ROOT || !self.contains(id) {
            return;
        }
        self.detach(id);
        let doomed: Vec<NodeId> = self.descendants(id).collect();
        for node_id in doomed {
            let slot = &mut self.slots[node_id.index()];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node_id.index);
        }
    }

    /// Replace all children of `parent` with `new_children`, releasing the
    /// old subtrees.
    pub fn replace_children(&mut self, parent: NodeId, new_children: &[NodeId]) {
        let old: Vec<NodeId> = self.children(parent).to_vec();
        for child in old {
            self.release(child);
        }
        for &child in new_children {
            self.append_child(parent, child);
        }
    }

    /// Get the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Get all children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], |n| n.children.as_slice())
    }

    /// The sibling immediately before `id` in its parent's child list.
    #[must_use]
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(id)?);
        let position = siblings.iter().position(|&c| c == id)?;
        position.checked_sub(1).map(|p| siblings[p])
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        id == ancestor || self.ancestors(id).any(|a| a == ancestor)
    }

    /// Iterate over all ancestors of a node, from parent to root.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> AncestorIterator<'_> {
        AncestorIterator {
            tree: self,
            current: self.parent(id),
        }
    }

    /// Iterate over `id` and its descendants in tree order (preorder).
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let stack = if self.contains(id) { vec![id] } else { Vec::new() };
        Descendants { tree: self, stack }
    }

    /// Every node reachable from the root, in tree order.
    #[must_use]
    pub fn iter_all(&self) -> Descendants<'_> {
        self.descendants(NodeId::ROOT)
    }

    /// Get element data if this node is an element.
    #[must_use]
    pub fn as_element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element(data) => Some(data),
            NodeData::Text(_) => None,
        })
    }

    /// Get mutable element data if this node is an element.
    pub fn as_element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id).and_then(|n| match &mut n.data {
            NodeData::Element(data) => Some(data),
            NodeData::Text(_) => None,
        })
    }

    /// Get text content if this node is a text node.
    #[must_use]
    pub fn as_text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(s) => Some(s.as_str()),
            NodeData::Element(_) => None,
        })
    }

    /// Tag name of an element node.
    #[must_use]
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.as_element(id).map(|e| e.tag_name.as_str())
    }

    /// Text of the first text child, used for button labels.
    #[must_use]
    pub fn first_text_child(&self, id: NodeId) -> Option<&str> {
        self.children(id).iter().find_map(|&c| self.as_text(c))
    }

    /// Check the structural invariant: every child's parent link points back
    /// at the node whose list contains it, and no node is reachable twice.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        for id in self.iter_all() {
            if !seen.insert(id) {
                return false;
            }
            if self
                .children(id)
                .iter()
                .any(|&child| self.parent(child) != Some(id))
            {
                return false;
            }
        }
        true
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over ancestors of a node.
#[derive(Debug)]
pub struct AncestorIterator<'a> {
    tree: &'a DomTree,
    current: Option<NodeId>,
}

impl Iterator for AncestorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.tree.parent(id);
        Some(id)
    }
}

/// Preorder iterator over a subtree.
#[derive(Debug)]
pub struct Descendants<'a> {
    tree: &'a DomTree,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}
