mod common;

use common::{Anchor, CIRCLE, Circle, LINK, Link, SQUARE, TETHER, Tether, registry};
use reliquary::fixup::{DeserializeQueue, SerializeQueue, Slot};
use reliquary::{Archive, Diagnostic, NodeKind, Universe, pass};

/// A link stored before the circle it points at.
fn forward_archive() -> Archive {
    let mut archive = Archive::new();
    let mut root = archive.root_mut();
    {
        let mut link = root.index("a-link");
        link.index("class").set("Link");
        link.index("label").set("first");
        link.index("target").set("z-circle");
        link.index("circle").set("z-circle");
    }
    {
        let mut circle = root.index("z-circle");
        circle.index("class").set("Circle");
        circle.index("name").set("wheel");
        circle.index("radius").set(3.0);
    }
    archive
}

#[test]
fn forward_references_resolve_after_construction() -> Result<(), Box<dyn std::error::Error>> {
    let archive = forward_archive();
    let mut universe = Universe::new();

    let report = pass::load(&archive, &registry(), &mut universe);
    assert!(report.is_clean(), "{:?}", report.diagnostics);
    assert_eq!(report.objects, 2);
    assert_eq!(report.references_resolved, 2);

    let link = universe.get_object("a-link").ok_or("link missing")?;
    let circle = universe.get_object("z-circle").ok_or("circle missing")?;
    let link = universe.get::<Link>(link).ok_or("not a link")?;
    assert_eq!(link.label, "first");
    assert_eq!(link.target, Some(circle));
    assert_eq!(link.circle, Some(circle));
    assert_eq!(universe.get::<Circle>(circle).map(|c| c.radius), Some(3.0));
    Ok(())
}

#[test]
fn unknown_identifier_leaves_slot_null_with_one_diagnostic() -> Result<(), Box<dyn std::error::Error>> {
    let mut archive = Archive::new();
    {
        let mut root = archive.root_mut();
        let mut link = root.index("link");
        link.index("class").set("Link");
        link.index("target").set("nobody");
    }

    let mut universe = Universe::new();
    let report = pass::load(&archive, &registry(), &mut universe);

    assert_eq!(report.objects, 1);
    assert_eq!(report.references_resolved, 0);
    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::UnknownReference {
            identifier: "nobody".to_string(),
            attribute: "Link.target".to_string(),
        }]
    );

    let link = universe.get_object("link").ok_or("link missing")?;
    assert_eq!(universe.get::<Link>(link).and_then(|l| l.target), None);
    Ok(())
}

#[test]
fn incompatible_target_is_dropped() -> Result<(), Box<dyn std::error::Error>> {
    let mut archive = Archive::new();
    {
        let mut root = archive.root_mut();
        let mut link = root.index("link");
        link.index("class").set("Link");
        link.index("target").set("box");
        link.index("circle").set("box");
        root.index("box").index("class").set("Square");
    }

    let mut universe = Universe::new();
    let report = pass::load(&archive, &registry(), &mut universe);

    // A square is a shape, but not a circle.
    assert_eq!(report.references_resolved, 1);
    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::ReferenceTypeMismatch {
            identifier: "box".to_string(),
            attribute: "Link.circle".to_string(),
            expected: "Circle",
            found: "Square",
        }]
    );

    let link = universe.get_object("link").ok_or("link missing")?;
    let square = universe.get_object("box").ok_or("square missing")?;
    let link = universe.get::<Link>(link).ok_or("not a link")?;
    assert_eq!(link.target, Some(square));
    assert_eq!(link.circle, None);
    Ok(())
}

#[test]
fn non_string_reference_node_queues_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut archive = Archive::new();
    archive.root_mut().index("empty");
    archive.root_mut().index("number").set(5);

    let mut universe = Universe::new();
    let owner = LINK.construct(&mut universe)?;
    let slot = Slot {
        owner,
        declaring: &LINK,
        attribute: &LINK.attributes()[2],
    };

    let mut fixups = DeserializeQueue::new();
    fixups.register(archive.root().index("empty"), slot);
    fixups.register(archive.root().index("number"), slot);
    fixups.register(archive.root().index("absent"), slot);
    assert!(fixups.is_empty());

    let resolution = fixups.resolve(&mut universe);
    assert_eq!(resolution.resolved, 0);
    assert!(resolution.diagnostics.is_empty());
    Ok(())
}

#[test]
fn null_reference_serializes_as_empty() -> Result<(), Box<dyn std::error::Error>> {
    let mut universe = Universe::new();
    let link = LINK.construct(&mut universe)?;
    universe.set_id(link, "link")?;

    let mut archive = Archive::new();
    let report = pass::save(&mut universe, &mut archive);
    assert!(report.is_clean());

    let target = archive.root().index("link").index("target");
    assert_eq!(target.kind(), NodeKind::Empty);
    assert_eq!(target.get::<String>(), None);
    Ok(())
}

#[test]
fn save_writes_identifiers_for_live_references() -> Result<(), Box<dyn std::error::Error>> {
    let mut universe = Universe::new();
    let circle = CIRCLE.construct(&mut universe)?;
    let link = LINK.construct(&mut universe)?;
    universe.set_id(link, "link")?;
    if let Some(l) = universe.get_mut::<Link>(link) {
        l.target = Some(circle);
        l.circle = Some(circle);
        l.tags = vec!["a".to_string(), "b".to_string()];
    }

    let mut archive = Archive::new();
    let report = pass::save(&mut universe, &mut archive);
    assert_eq!(report.objects, 2);
    assert_eq!(report.references_resolved, 2);

    // The circle had no identifier; saving it assigned one.
    let circle_id = universe.identifier(circle).ok_or("no identifier")?.to_string();
    let stored = archive.root().index("link");
    assert_eq!(stored.index("target").get::<String>(), Some(circle_id.clone()));
    assert_eq!(stored.index("circle").get::<String>(), Some(circle_id.clone()));
    assert_eq!(stored.index("tags").size(), 2);
    assert_eq!(
        archive.root().index(&circle_id).index("class").get::<String>().as_deref(),
        Some("Circle")
    );
    Ok(())
}

#[test]
fn references_to_destroyed_objects_are_cleared_on_save() -> Result<(), Box<dyn std::error::Error>> {
    let mut universe = Universe::new();
    let square = SQUARE.construct(&mut universe)?;
    let link = LINK.construct(&mut universe)?;
    universe.set_id(link, "link")?;
    if let Some(l) = universe.get_mut::<Link>(link) {
        l.target = Some(square);
    }
    SQUARE.destruct(&mut universe, square)?;

    let mut archive = Archive::new();
    let report = pass::save(&mut universe, &mut archive);
    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::DanglingReference {
            attribute: "target".to_string(),
        }]
    );
    assert!(archive.root().index("link").index("target").is_empty());
    Ok(())
}

#[test]
fn serialize_queue_resolves_in_registration_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut universe = Universe::new();
    let first = CIRCLE.construct(&mut universe)?;
    let second = CIRCLE.construct(&mut universe)?;
    let gone = CIRCLE.construct(&mut universe)?;
    let lost = CIRCLE.construct(&mut universe)?;
    CIRCLE.destruct(&mut universe, gone)?;
    CIRCLE.destruct(&mut universe, lost)?;

    let mut archive = Archive::new();
    let (shared, a, b) = {
        let mut root = archive.root_mut();
        (root.push().id(), root.push().id(), root.push().id())
    };

    // Both entries write the same node, so the later registration wins.
    let mut fixups = SerializeQueue::new();
    fixups.register(shared, Some(first), "shared");
    fixups.register(shared, Some(second), "shared");
    fixups.register(b, Some(lost), "later");
    fixups.register(a, Some(gone), "earlier");
    assert_eq!(fixups.len(), 4);

    let resolution = fixups.resolve(&mut archive, &mut universe);
    assert_eq!(resolution.resolved, 2);
    assert_eq!(
        archive.node(shared).get::<String>().as_deref(),
        universe.identifier(second)
    );
    assert_eq!(
        resolution.diagnostics,
        vec![
            Diagnostic::DanglingReference {
                attribute: "later".to_string(),
            },
            Diagnostic::DanglingReference {
                attribute: "earlier".to_string(),
            },
        ]
    );
    Ok(())
}

#[test]
fn deserialize_queue_reports_in_registration_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut archive = Archive::new();
    {
        let mut root = archive.root_mut();
        root.index("first").set("zz");
        root.index("second").set("aa");
    }

    let mut universe = Universe::new();
    let mut fixups = DeserializeQueue::new();
    for key in ["first", "second"] {
        let owner = LINK.construct(&mut universe)?;
        let slot = Slot {
            owner,
            declaring: &LINK,
            attribute: &LINK.attributes()[2],
        };
        fixups.register(archive.root().index(key), slot);
    }
    assert_eq!(fixups.len(), 2);

    let resolution = fixups.resolve(&mut universe);
    assert_eq!(resolution.resolved, 0);
    let identifiers: Vec<&str> = resolution
        .diagnostics
        .iter()
        .filter_map(|d| match d {
            Diagnostic::UnknownReference { identifier, .. } => Some(identifier.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(identifiers, vec!["zz", "aa"]);
    Ok(())
}

#[test]
fn inherited_references_resolve_into_the_superclass() -> Result<(), Box<dyn std::error::Error>> {
    let mut universe = Universe::new();
    let head = TETHER.construct(&mut universe)?;
    let tail = TETHER.construct(&mut universe)?;
    universe.set_id(head, "head")?;
    universe.set_id(tail, "tail")?;
    if let Some(t) = universe.get_mut::<Tether>(head) {
        t.anchor.next = Some(tail);
        t.length = 2.5;
    }

    let mut archive = Archive::new();
    let saved = pass::save(&mut universe, &mut archive);
    assert!(saved.is_clean());
    assert_eq!(saved.references_resolved, 1);
    let keys: Vec<&str> = archive.root().index("head").keys().collect();
    assert_eq!(keys, vec!["class", "length", "next"]);
    assert_eq!(
        archive.root().index("head").index("next").get::<String>().as_deref(),
        Some("tail")
    );

    let mut restored = Universe::new();
    let loaded = pass::load(&archive, &registry(), &mut restored);
    assert!(loaded.is_clean(), "{:?}", loaded.diagnostics);
    assert_eq!(loaded.references_resolved, 1);

    let head = restored.get_object("head").ok_or("head missing")?;
    let tail = restored.get_object("tail").ok_or("tail missing")?;
    assert_eq!(restored.get::<Anchor>(head).and_then(|a| a.next), Some(tail));
    assert_eq!(restored.get::<Tether>(head).map(|t| t.length), Some(2.5));
    assert_eq!(restored.get::<Anchor>(tail).and_then(|a| a.next), None);
    Ok(())
}

#[test]
fn inherited_reference_diagnostics_name_the_declaring_type() {
    let mut archive = Archive::new();
    {
        let mut root = archive.root_mut();
        let mut tether = root.index("tether");
        tether.index("class").set("Tether");
        tether.index("next").set("missing");
    }

    let mut universe = Universe::new();
    let report = pass::load(&archive, &registry(), &mut universe);
    assert_eq!(report.objects, 1);
    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::UnknownReference {
            identifier: "missing".to_string(),
            attribute: "Anchor.next".to_string(),
        }]
    );
}

#[test]
fn handles_do_not_cross_universes() -> Result<(), Box<dyn std::error::Error>> {
    let mut one = Universe::new();
    let mut two = Universe::new();
    let circle = CIRCLE.construct(&mut one)?;
    let _other = CIRCLE.construct(&mut two)?;

    assert!(one.contains(circle));
    assert!(!two.contains(circle));
    assert!(two.get::<Circle>(circle).is_none());
    assert!(two.get_id(circle).is_none());
    Ok(())
}

#[test]
fn identifiers_are_unique_per_universe() -> Result<(), Box<dyn std::error::Error>> {
    let mut universe = Universe::new();
    let first = CIRCLE.construct(&mut universe)?;
    let second = CIRCLE.construct(&mut universe)?;

    universe.set_id(first, "wheel")?;
    assert!(universe.set_id(second, "wheel").is_err());
    universe.set_id(first, "rim")?;
    assert!(universe.get_object("wheel").is_none());
    universe.set_id(second, "wheel")?;
    assert_eq!(universe.get_object("wheel"), Some(second));

    let third = CIRCLE.construct(&mut universe)?;
    let generated = universe.get_id(third);
    assert!(generated.is_some_and(|id| !id.is_empty()));
    Ok(())
}

#[test]
fn unbuildable_objects_are_skipped_and_reported() -> Result<(), Box<dyn std::error::Error>> {
    let mut archive = Archive::new();
    {
        let mut root = archive.root_mut();
        root.index("classless").index("name").set("x");
        root.index("ghost").index("class").set("Ghost");
        root.index("shape").index("class").set("Shape");
        root.index("wheel").index("class").set("Circle");
    }

    let mut universe = Universe::new();
    let existing = SQUARE.construct(&mut universe)?;
    universe.set_id(existing, "wheel")?;

    let report = pass::load(&archive, &registry(), &mut universe);
    assert_eq!(report.objects, 0);
    assert_eq!(
        report.diagnostics,
        vec![
            Diagnostic::MissingClass {
                identifier: "classless".to_string(),
            },
            Diagnostic::UnknownClass {
                identifier: "ghost".to_string(),
                class: "Ghost".to_string(),
            },
            Diagnostic::AbstractClass {
                identifier: "shape".to_string(),
                class: "Shape".to_string(),
            },
            Diagnostic::DuplicateIdentifier {
                identifier: "wheel".to_string(),
            },
        ]
    );
    assert_eq!(universe.len(), 1);
    assert_eq!(universe.get_object("wheel"), Some(existing));
    Ok(())
}

#[test]
fn scalar_root_is_rejected() {
    let mut archive = Archive::new();
    archive.root_mut().set(3);

    let mut universe = Universe::new();
    let report = pass::load(&archive, &registry(), &mut universe);
    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::MalformedRoot {
            found: NodeKind::Integer,
        }]
    );
    assert!(universe.is_empty());

    let empty = pass::load(&Archive::new(), &registry(), &mut universe);
    assert!(empty.is_clean());
    assert_eq!(empty.objects, 0);
}

#[test]
fn graphs_survive_save_and_load() -> Result<(), Box<dyn std::error::Error>> {
    let mut universe = Universe::new();
    let circle = CIRCLE.construct(&mut universe)?;
    let square = SQUARE.construct(&mut universe)?;
    let link = LINK.construct(&mut universe)?;
    universe.set_id(circle, "wheel")?;
    universe.set_id(square, "box")?;
    universe.set_id(link, "link")?;
    if let Some(c) = universe.get_mut::<Circle>(circle) {
        c.shape.name = "round".to_string();
        c.radius = 1.25;
    }
    if let Some(l) = universe.get_mut::<Link>(link) {
        l.label = "both".to_string();
        l.target = Some(square);
        l.circle = Some(circle);
    }

    let mut archive = Archive::new();
    assert!(pass::save(&mut universe, &mut archive).is_clean());

    let mut restored = Universe::new();
    let report = pass::load(&archive, &registry(), &mut restored);
    assert!(report.is_clean(), "{:?}", report.diagnostics);
    assert_eq!(report.objects, 3);
    assert_eq!(report.references_resolved, 2);

    let wheel = restored.get_object("wheel").ok_or("wheel missing")?;
    let boxed = restored.get_object("box").ok_or("box missing")?;
    let link = restored.get_object("link").ok_or("link missing")?;
    let circle = restored.get::<Circle>(wheel).ok_or("not a circle")?;
    assert_eq!(circle.shape.name, "round");
    assert_eq!(circle.radius, 1.25);
    let link = restored.get::<Link>(link).ok_or("not a link")?;
    assert_eq!(link.label, "both");
    assert_eq!(link.target, Some(boxed));
    assert_eq!(link.circle, Some(wheel));

    // Saving the restored graph reproduces the same tree.
    let mut again = Archive::new();
    pass::save(&mut restored, &mut again);
    assert_eq!(
        reliquary::codec::digest(again.root()),
        reliquary::codec::digest(archive.root())
    );
    Ok(())
}

#[test]
fn diagnostics_serialize_with_a_kind_tag() -> Result<(), Box<dyn std::error::Error>> {
    let failed = Diagnostic::ConstructionFailed {
        identifier: "x".to_string(),
        reason: "Object not found".to_string(),
    };
    assert_eq!(
        failed.to_string(),
        r#"object "x" could not be constructed: Object not found"#
    );
    let json = serde_json::to_value(&failed)?;
    assert_eq!(json["kind"], "construction_failed");
    assert_eq!(json["reason"], "Object not found");

    let mut archive = Archive::new();
    archive.root_mut().index("ghost").index("class").set("Ghost");
    let report = pass::load(&archive, &registry(), &mut Universe::new());
    let json = serde_json::to_value(&report)?;
    assert_eq!(json["objects"], 0);
    assert_eq!(json["diagnostics"][0]["kind"], "unknown_class");
    assert_eq!(json["diagnostics"][0]["class"], "Ghost");
    Ok(())
}
