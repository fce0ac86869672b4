#![allow(dead_code)]

use reliquary::{ObjectHandle, StructType, TypeRegistry};
use std::fs;
use std::sync::LazyLock;

pub fn cleanup(path: &str) {
    let _ = fs::remove_file(path);
}

#[derive(Debug, Default, PartialEq)]
pub struct Base {
    pub a: i32,
    pub b: String,
}

#[derive(Debug, Default, PartialEq)]
pub struct Derived {
    pub base: Base,
    pub c: f64,
}

#[derive(Debug, Default)]
pub struct Shape {
    pub name: String,
}

#[derive(Debug, Default)]
pub struct Circle {
    pub shape: Shape,
    pub radius: f64,
}

#[derive(Debug, Default)]
pub struct Square {
    pub shape: Shape,
    pub side: f64,
}

/// Links to any shape and to another circle.
#[derive(Debug, Default)]
pub struct Link {
    pub label: String,
    pub tags: Vec<String>,
    pub target: Option<ObjectHandle>,
    pub circle: Option<ObjectHandle>,
}

/// Declares a reference that its subtypes inherit.
#[derive(Debug, Default)]
pub struct Anchor {
    pub next: Option<ObjectHandle>,
}

#[derive(Debug, Default)]
pub struct Tether {
    pub anchor: Anchor,
    pub length: f64,
}

pub static BASE: LazyLock<StructType> = LazyLock::new(|| {
    StructType::builder::<Base>("Base")
        .description("two plain fields")
        .field("a", |s| &s.a, |s| &mut s.a)
        .field("b", |s| &s.b, |s| &mut s.b)
        .build()
});

pub static DERIVED: LazyLock<StructType> = LazyLock::new(|| {
    StructType::builder::<Derived>("Derived")
        .extends(&BASE, |d| &d.base, |d| &mut d.base)
        .field("c", |d| &d.c, |d| &mut d.c)
        .build()
});

pub static SHAPE: LazyLock<StructType> = LazyLock::new(|| {
    StructType::builder::<Shape>("Shape")
        .abstract_type()
        .field("name", |s| &s.name, |s| &mut s.name)
        .build()
});

pub static CIRCLE: LazyLock<StructType> = LazyLock::new(|| {
    StructType::builder::<Circle>("Circle")
        .extends(&SHAPE, |c| &c.shape, |c| &mut c.shape)
        .field("radius", |c| &c.radius, |c| &mut c.radius)
        .build()
});

pub static SQUARE: LazyLock<StructType> = LazyLock::new(|| {
    StructType::builder::<Square>("Square")
        .extends(&SHAPE, |s| &s.shape, |s| &mut s.shape)
        .field("side", |s| &s.side, |s| &mut s.side)
        .build()
});

pub static LINK: LazyLock<StructType> = LazyLock::new(|| {
    StructType::builder::<Link>("Link")
        .field("label", |l| &l.label, |l| &mut l.label)
        .field("tags", |l| &l.tags, |l| &mut l.tags)
        .reference("target", || &*SHAPE, |l| &l.target, |l| &mut l.target)
        .reference("circle", || &*CIRCLE, |l| &l.circle, |l| &mut l.circle)
        .build()
});

pub static ANCHOR: LazyLock<StructType> = LazyLock::new(|| {
    StructType::builder::<Anchor>("Anchor")
        .reference("next", || &*ANCHOR, |a| &a.next, |a| &mut a.next)
        .build()
});

pub static TETHER: LazyLock<StructType> = LazyLock::new(|| {
    StructType::builder::<Tether>("Tether")
        .extends(&ANCHOR, |t| &t.anchor, |t| &mut t.anchor)
        .field("length", |t| &t.length, |t| &mut t.length)
        .build()
});

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    for ty in [
        &*BASE, &*DERIVED, &*SHAPE, &*CIRCLE, &*SQUARE, &*LINK, &*ANCHOR, &*TETHER,
    ] {
        registry
            .register(ty)
            .expect("sample type names are unique");
    }
    registry
}
