//! Whole-graph save and load.
//!
//! A universe is stored as a Map keyed by object identifier; each value is
//! the object's own Map node as written by [`StructType::serialize`].

use serde::Serialize;

use crate::archive::{Archive, NodeKind};
use crate::error::ReliquaryError;
use crate::fixup::{DeserializeQueue, Diagnostic, Resolution, SerializeQueue, warn};
use crate::struct_type::{CLASS_KEY, StructType, TypeRegistry};
use crate::universe::{ObjectHandle, Universe};

#[derive(Debug, Default, Clone, Serialize)]
pub struct PassReport {
    pub objects: usize,
    pub references_resolved: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl PassReport {
    /// True when nothing was dropped or left unresolved.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn absorb(&mut self, resolution: Resolution) {
        self.references_resolved += resolution.resolved;
        self.diagnostics.extend(resolution.diagnostics);
    }
}

/// Writes every live object of `universe` under the archive root, replacing
/// whatever the root held. Objects without an identifier are assigned one.
pub fn save(universe: &mut Universe, archive: &mut Archive) -> PassReport {
    let mut report = PassReport::default();
    let mut fixups = SerializeQueue::new();

    let root = archive.root_id();
    archive.node_mut(root).clear_to(NodeKind::Map);

    let handles: Vec<_> = universe.handles().collect();
    for handle in handles {
        let Some(identifier) = universe.get_id(handle) else {
            continue;
        };
        let Some((ty, object)) = universe.object(handle) else {
            continue;
        };

        let mut objects = archive.node_mut(root);
        ty.serialize(object, &mut objects.index(&identifier), &mut fixups);
        report.objects += 1;
    }

    log::debug!(
        "saved {} objects, resolving {} references",
        report.objects,
        fixups.len()
    );
    report.absorb(fixups.resolve(archive, universe));
    report
}

/// Reconstructs the objects stored under the archive root into `universe`.
///
/// Every object is constructed and populated before any reference is
/// resolved. Objects that cannot be built are skipped and reported; the pass
/// itself never fails.
pub fn load(archive: &Archive, registry: &TypeRegistry, universe: &mut Universe) -> PassReport {
    let mut report = PassReport::default();
    let root = archive.root();

    match root.kind() {
        NodeKind::Map => {}
        NodeKind::Empty => return report,
        found => {
            warn(&mut report.diagnostics, Diagnostic::MalformedRoot { found });
            return report;
        }
    }

    let mut fixups = DeserializeQueue::new();
    for (identifier, node) in root.entries() {
        let Some(ty) = resolve_class(registry, identifier, node.index(CLASS_KEY).get(), &mut report)
        else {
            continue;
        };

        if universe.get_object(identifier).is_some() {
            warn(
                &mut report.diagnostics,
                Diagnostic::DuplicateIdentifier {
                    identifier: identifier.to_string(),
                },
            );
            continue;
        }

        let handle = match place(ty, universe, identifier) {
            Ok(handle) => handle,
            Err(e) => {
                warn(
                    &mut report.diagnostics,
                    Diagnostic::ConstructionFailed {
                        identifier: identifier.to_string(),
                        reason: e.to_string(),
                    },
                );
                continue;
            }
        };

        if let Some(object) = universe.object_mut(handle) {
            ty.deserialize(object, handle, node, &mut fixups);
        }
        report.objects += 1;
    }

    log::debug!(
        "constructed {} objects, resolving {} references",
        report.objects,
        fixups.len()
    );
    report.absorb(fixups.resolve(universe));
    report
}

/// Constructs an instance of `ty` registered under `identifier`. Nothing is
/// left in the universe on failure.
fn place(
    ty: &'static StructType,
    universe: &mut Universe,
    identifier: &str,
) -> Result<ObjectHandle, ReliquaryError> {
    let handle = ty.construct(universe)?;
    if let Err(e) = universe.set_id(handle, identifier) {
        ty.destruct(universe, handle)?;
        return Err(e);
    }
    Ok(handle)
}

fn resolve_class(
    registry: &TypeRegistry,
    identifier: &str,
    class: Option<String>,
    report: &mut PassReport,
) -> Option<&'static StructType> {
    let diagnostic = match class {
        None => Diagnostic::MissingClass {
            identifier: identifier.to_string(),
        },
        Some(class) => match registry.get(&class) {
            Some(ty) if !ty.is_abstract() => return Some(ty),
            Some(_) => Diagnostic::AbstractClass {
                identifier: identifier.to_string(),
                class,
            },
            None => Diagnostic::UnknownClass {
                identifier: identifier.to_string(),
                class,
            },
        },
    };
    warn(&mut report.diagnostics, diagnostic);
    None
}
