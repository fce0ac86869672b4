//! Arena-owned value tree exchanged between codecs and type descriptors.
//!
//! Every node lives in an [`Archive`]; parents refer to children by
//! [`NodeId`]. Clearing a node hands its whole subtree back to the arena, and
//! the slot generation is bumped so outstanding ids to released nodes go stale.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::value::{FromNode, ToNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    Empty,
    Integer,
    Float,
    String,
    Array,
    Map,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Empty,
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<NodeId>),
    Map(BTreeMap<String, NodeId>),
}

impl NodeValue {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeValue::Empty => NodeKind::Empty,
            NodeValue::Integer(_) => NodeKind::Integer,
            NodeValue::Float(_) => NodeKind::Float,
            NodeValue::String(_) => NodeKind::String,
            NodeValue::Array(_) => NodeKind::Array,
            NodeValue::Map(_) => NodeKind::Map,
        }
    }

    fn blank(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Empty => NodeValue::Empty,
            NodeKind::Integer => NodeValue::Integer(0),
            NodeKind::Float => NodeValue::Float(0.0),
            NodeKind::String => NodeValue::String(String::new()),
            NodeKind::Array => NodeValue::Array(Vec::new()),
            NodeKind::Map => NodeValue::Map(BTreeMap::new()),
        }
    }

    fn into_children(self) -> Vec<NodeId> {
        match self {
            NodeValue::Array(items) => items,
            NodeValue::Map(entries) => entries.into_values().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    value: Option<NodeValue>,
}

#[derive(Debug)]
pub struct Archive {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Archive {
    pub fn new() -> Self {
        let mut archive = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        archive.root = archive.allocate();
        archive
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node(self.root)
    }

    pub fn root_mut(&mut self) -> NodeMut<'_> {
        let root = self.root;
        self.node_mut(root)
    }

    /// Read view of `id`. Stale ids read as Empty.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef {
            archive: self,
            id: Some(id),
        }
    }

    /// Write cursor for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was released by a `clear` of one of its ancestors.
    #[track_caller]
    pub fn node_mut(&mut self, id: NodeId) -> NodeMut<'_> {
        if !self.contains(id) {
            panic!("stale node handle {id:?}");
        }
        NodeMut { archive: self, id }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.value(id).is_some()
    }

    pub fn live_nodes(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn value(&self, id: NodeId) -> Option<&NodeValue> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    #[track_caller]
    fn value_mut(&mut self, id: NodeId) -> &mut NodeValue {
        match self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
        {
            Some(value) => value,
            None => panic!("stale node handle {id:?}"),
        }
    }

    fn allocate(&mut self) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(NodeValue::Empty);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(NodeValue::Empty),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Replaces the payload of `id` with a blank value of `kind` and frees
    /// everything the old payload owned.
    fn reset(&mut self, id: NodeId, kind: NodeKind) {
        let old = std::mem::replace(self.value_mut(id), NodeValue::blank(kind));
        let mut pending = old.into_children();
        while let Some(child) = pending.pop() {
            let Some(slot) = self.slots.get_mut(child.index as usize) else {
                continue;
            };
            if slot.generation != child.generation {
                continue;
            }
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(child.index);
                pending.extend(value.into_children());
            }
        }
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a node. A view may point at nothing (a missing map key,
/// an out-of-range position), in which case it behaves as an Empty node.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    archive: &'a Archive,
    id: Option<NodeId>,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    pub fn value(&self) -> Option<&'a NodeValue> {
        self.id.and_then(|id| self.archive.value(id))
    }

    pub fn kind(&self) -> NodeKind {
        self.value().map_or(NodeKind::Empty, NodeValue::kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kind() == NodeKind::Empty
    }

    pub fn is_array(&self) -> bool {
        self.kind() == NodeKind::Array
    }

    pub fn is_map(&self) -> bool {
        self.kind() == NodeKind::Map
    }

    /// Reads the node as `T`; `None` when the tag does not match `T`'s family.
    pub fn get<T: FromNode>(&self) -> Option<T> {
        T::from_node(*self)
    }

    pub fn index(&self, key: &str) -> NodeRef<'a> {
        let id = match self.value() {
            Some(NodeValue::Map(entries)) => entries.get(key).copied(),
            _ => None,
        };
        NodeRef {
            archive: self.archive,
            id,
        }
    }

    pub fn at(&self, position: usize) -> NodeRef<'a> {
        let id = match self.value() {
            Some(NodeValue::Array(items)) => items.get(position).copied(),
            _ => None,
        };
        NodeRef {
            archive: self.archive,
            id,
        }
    }

    pub fn size(&self) -> usize {
        match self.value() {
            Some(NodeValue::Array(items)) => items.len(),
            Some(NodeValue::Map(entries)) => entries.len(),
            _ => 0,
        }
    }

    /// Map entries in key order; nothing for other kinds.
    pub fn entries(self) -> impl Iterator<Item = (&'a str, NodeRef<'a>)> + 'a {
        let archive = self.archive;
        let entries = match self.value() {
            Some(NodeValue::Map(entries)) => Some(entries),
            _ => None,
        };
        entries.into_iter().flat_map(move |entries| {
            entries.iter().map(move |(key, id)| {
                (
                    key.as_str(),
                    NodeRef {
                        archive,
                        id: Some(*id),
                    },
                )
            })
        })
    }

    pub fn keys(self) -> impl Iterator<Item = &'a str> + 'a {
        self.entries().map(|(key, _)| key)
    }

    /// Array elements in position order; nothing for other kinds.
    pub fn elements(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let archive = self.archive;
        let items = match self.value() {
            Some(NodeValue::Array(items)) => Some(items),
            _ => None,
        };
        items.into_iter().flat_map(move |items| {
            items.iter().map(move |id| NodeRef {
                archive,
                id: Some(*id),
            })
        })
    }
}

/// Mutable cursor over one node of an [`Archive`].
#[derive(Debug)]
pub struct NodeMut<'a> {
    archive: &'a mut Archive,
    id: NodeId,
}

impl NodeMut<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn view(&self) -> NodeRef<'_> {
        NodeRef {
            archive: self.archive,
            id: Some(self.id),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.view().kind()
    }

    pub fn size(&self) -> usize {
        self.view().size()
    }

    pub fn get<T: FromNode>(&self) -> Option<T> {
        self.view().get()
    }

    pub fn set<T: ToNode>(&mut self, value: T) {
        value.to_node(self);
    }

    pub fn clear(&mut self) {
        self.clear_to(NodeKind::Empty);
    }

    /// Drops the payload and all children, leaving a blank node of `kind`.
    pub fn clear_to(&mut self, kind: NodeKind) {
        self.archive.reset(self.id, kind);
    }

    /// Stores a scalar payload, discarding whatever the node held before.
    pub(crate) fn store(&mut self, value: NodeValue) {
        self.archive.reset(self.id, NodeKind::Empty);
        *self.archive.value_mut(self.id) = value;
    }

    /// Child under `key`, created Empty if absent. A non-Map node becomes an
    /// empty Map first.
    pub fn index(&mut self, key: &str) -> NodeMut<'_> {
        if !matches!(self.archive.value_mut(self.id), NodeValue::Map(_)) {
            self.archive.reset(self.id, NodeKind::Map);
        }

        let existing = match self.archive.value_mut(self.id) {
            NodeValue::Map(entries) => entries.get(key).copied(),
            _ => None,
        };

        let child = match existing {
            Some(child) => child,
            None => {
                let child = self.archive.allocate();
                if let NodeValue::Map(entries) = self.archive.value_mut(self.id) {
                    entries.insert(key.to_string(), child);
                }
                child
            }
        };

        NodeMut {
            archive: self.archive,
            id: child,
        }
    }

    /// Existing array element at `position`.
    ///
    /// # Panics
    ///
    /// Panics if the node is not an Array or `position` is out of range; use
    /// [`NodeMut::push`] to grow an array.
    #[track_caller]
    pub fn at(&mut self, position: usize) -> NodeMut<'_> {
        let child = match self.archive.value_mut(self.id) {
            NodeValue::Array(items) => items[position],
            other => panic!("positional index into a {:?} node", other.kind()),
        };
        NodeMut {
            archive: self.archive,
            id: child,
        }
    }

    /// Appends an Empty element. A non-Array node becomes an empty Array first.
    pub fn push(&mut self) -> NodeMut<'_> {
        if !matches!(self.archive.value_mut(self.id), NodeValue::Array(_)) {
            self.archive.reset(self.id, NodeKind::Array);
        }

        let child = self.archive.allocate();
        if let NodeValue::Array(items) = self.archive.value_mut(self.id) {
            items.push(child);
        }
        NodeMut {
            archive: self.archive,
            id: child,
        }
    }
}
