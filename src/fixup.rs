//! Deferred object-reference resolution.
//!
//! References are never resolved while a graph is being walked. A load pass
//! queues (identifier, slot) records and resolves them once every object of
//! the graph exists, which is what makes forward references work. A save pass
//! queues (node, handle) records and writes identifiers after the walk.
//! Both queues resolve in the order entries were registered.

use serde::Serialize;
use thiserror::Error;

use crate::archive::{Archive, NodeId, NodeKind, NodeRef};
use crate::struct_type::{Attribute, StructType};
use crate::universe::{ObjectHandle, Universe};

/// A recoverable problem found during a pass. The affected field or object is
/// left at its default and the pass carries on.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("{attribute}: unknown reference {identifier:?}")]
    UnknownReference {
        identifier: String,
        attribute: String,
    },

    #[error("{attribute}: {identifier:?} is a {found}, expected {expected}")]
    ReferenceTypeMismatch {
        identifier: String,
        attribute: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{attribute}: reference to a destroyed object")]
    DanglingReference { attribute: String },

    #[error("object {identifier:?} has no class")]
    MissingClass { identifier: String },

    #[error("object {identifier:?} has unknown class {class:?}")]
    UnknownClass { identifier: String, class: String },

    #[error("object {identifier:?} has abstract class {class:?}")]
    AbstractClass { identifier: String, class: String },

    #[error("object {identifier:?} could not be constructed: {reason}")]
    ConstructionFailed { identifier: String, reason: String },

    #[error("object {identifier:?} already exists")]
    DuplicateIdentifier { identifier: String },

    #[error("root node is {found:?}, expected a map of objects")]
    MalformedRoot { found: NodeKind },
}

pub(crate) fn warn(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    log::warn!("{diagnostic}");
    diagnostics.push(diagnostic);
}

/// Outcome of draining one queue.
#[derive(Debug, Default)]
pub struct Resolution {
    pub resolved: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// The field a resolved reference is written into: an attribute of the
/// `declaring` type, reached from the `owner` object.
#[derive(Clone, Copy)]
pub struct Slot {
    pub owner: ObjectHandle,
    pub declaring: &'static StructType,
    pub attribute: &'static Attribute,
}

impl Slot {
    fn label(&self) -> String {
        format!("{}.{}", self.declaring.name(), self.attribute.name())
    }
}

struct PendingLoad {
    identifier: String,
    slot: Slot,
}

#[derive(Default)]
pub struct DeserializeQueue {
    pending: Vec<PendingLoad>,
}

impl DeserializeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queues `slot` to receive the object named by `node`. A node that is not
    /// a string means "no reference": nothing is queued and the slot keeps its
    /// default.
    pub fn register(&mut self, node: NodeRef<'_>, slot: Slot) {
        if let Some(identifier) = node.get::<String>() {
            self.pending.push(PendingLoad { identifier, slot });
        }
    }

    /// Looks up every queued identifier and writes the checked handle into its
    /// slot. Only call once all objects of the graph have been constructed.
    pub fn resolve(self, universe: &mut Universe) -> Resolution {
        let mut resolution = Resolution::default();

        for PendingLoad { identifier, slot } in self.pending {
            let Some(target) = universe.get_object(&identifier) else {
                warn(
                    &mut resolution.diagnostics,
                    Diagnostic::UnknownReference {
                        identifier,
                        attribute: slot.label(),
                    },
                );
                continue;
            };

            if let Some(expected) = slot.attribute.target() {
                if universe.cast(target, expected).is_none() {
                    let found = universe.type_of(target).map_or("?", StructType::name);
                    warn(
                        &mut resolution.diagnostics,
                        Diagnostic::ReferenceTypeMismatch {
                            identifier,
                            attribute: slot.label(),
                            expected: expected.name(),
                            found,
                        },
                    );
                    continue;
                }
            }

            let Some(object) = universe.view_as_mut(slot.owner, slot.declaring) else {
                warn(
                    &mut resolution.diagnostics,
                    Diagnostic::DanglingReference {
                        attribute: slot.label(),
                    },
                );
                continue;
            };
            slot.attribute.assign_reference(object, Some(target));
            resolution.resolved += 1;
        }

        resolution
    }
}

struct PendingSave {
    node: NodeId,
    reference: Option<ObjectHandle>,
    attribute: &'static str,
}

#[derive(Default)]
pub struct SerializeQueue {
    pending: Vec<PendingSave>,
}

impl SerializeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn register(&mut self, node: NodeId, reference: Option<ObjectHandle>, attribute: &'static str) {
        self.pending.push(PendingSave {
            node,
            reference,
            attribute,
        });
    }

    /// Writes each referenced object's identifier into its node. Null
    /// references, and references to objects that no longer exist, leave the
    /// node Empty.
    pub fn resolve(self, archive: &mut Archive, universe: &mut Universe) -> Resolution {
        let mut resolution = Resolution::default();

        for PendingSave {
            node,
            reference,
            attribute,
        } in self.pending
        {
            if !archive.contains(node) {
                log::debug!("{attribute}: target node was released before resolution");
                continue;
            }

            let mut node = archive.node_mut(node);
            let Some(handle) = reference else {
                node.clear();
                continue;
            };

            match universe.get_id(handle) {
                Some(identifier) => {
                    node.set(identifier);
                    resolution.resolved += 1;
                }
                None => {
                    node.clear();
                    warn(
                        &mut resolution.diagnostics,
                        Diagnostic::DanglingReference {
                            attribute: attribute.to_string(),
                        },
                    );
                }
            }
        }

        resolution
    }
}
