//! Runtime type descriptors.
//!
//! A [`StructType`] describes one Rust type: its name, an optional single
//! superclass, and the attributes that are read from and written to a Map
//! node. A derived type embeds its superclass value as a field, and the
//! descriptor carries projections onto that field so superclass attributes
//! can be processed against the same object.
//!
//! Descriptors are built once and kept in statics:
//!
//! ```
//! use std::sync::LazyLock;
//! use reliquary::{ObjectHandle, StructType};
//!
//! #[derive(Default)]
//! struct Node {
//!     label: String,
//!     next: Option<ObjectHandle>,
//! }
//!
//! static NODE: LazyLock<StructType> = LazyLock::new(|| {
//!     StructType::builder::<Node>("Node")
//!         .field("label", |n| &n.label, |n| &mut n.label)
//!         .reference("next", || &*NODE, |n| &n.next, |n| &mut n.next)
//!         .build()
//! });
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::archive::{NodeMut, NodeRef};
use crate::error::ReliquaryError;
use crate::fixup::{DeserializeQueue, SerializeQueue, Slot};
use crate::universe::{ObjectHandle, Universe};
use crate::value::{FromNode, ToNode};

/// Key that records the most-derived type name of a serialized object.
pub const CLASS_KEY: &str = "class";

type ViewFn = Box<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;
type ViewMutFn = Box<dyn for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync>;
type SaveFn = Box<dyn Fn(&dyn Any, &mut NodeMut<'_>) + Send + Sync>;
type LoadFn = Box<dyn Fn(&mut dyn Any, NodeRef<'_>) + Send + Sync>;
type GetRefFn = Box<dyn Fn(&dyn Any) -> Option<ObjectHandle> + Send + Sync>;
type SetRefFn = Box<dyn Fn(&mut dyn Any, Option<ObjectHandle>) + Send + Sync>;

fn view_fn<F>(f: F) -> ViewFn
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Box::new(f)
}

fn view_mut_fn<F>(f: F) -> ViewMutFn
where
    F: for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync + 'static,
{
    Box::new(f)
}

fn save_fn<F>(f: F) -> SaveFn
where
    F: Fn(&dyn Any, &mut NodeMut<'_>) + Send + Sync + 'static,
{
    Box::new(f)
}

fn load_fn<F>(f: F) -> LoadFn
where
    F: Fn(&mut dyn Any, NodeRef<'_>) + Send + Sync + 'static,
{
    Box::new(f)
}

fn make<T: Any + Default>() -> Box<dyn Any> {
    Box::new(T::default())
}

struct Superclass {
    ty: &'static StructType,
    view: ViewFn,
    view_mut: ViewMutFn,
}

/// What an attribute stores.
#[derive(Clone, Copy)]
pub enum AttributeType {
    /// A value written directly into the node; carries the Rust type name.
    Value(&'static str),
    /// A link to another object, written as that object's identifier.
    Reference(fn() -> &'static StructType),
}

enum Access {
    Value {
        save: SaveFn,
        load: LoadFn,
    },
    Reference {
        get: GetRefFn,
        set: SetRefFn,
    },
}

pub struct Attribute {
    name: &'static str,
    ty: AttributeType,
    access: Access,
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.ty
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.ty, AttributeType::Reference(_))
    }

    /// Expected target type of a reference attribute.
    pub fn target(&self) -> Option<&'static StructType> {
        match self.ty {
            AttributeType::Reference(target) => Some(target()),
            AttributeType::Value(_) => None,
        }
    }

    /// Writes the attribute of `object` into `node`. References only queue a
    /// fixup; the identifier is filled in when `fixups` is resolved.
    pub fn serialize_attribute(
        &self,
        object: &dyn Any,
        node: &mut NodeMut<'_>,
        fixups: &mut SerializeQueue,
    ) {
        match &self.access {
            Access::Value { save, .. } => save(object, node),
            Access::Reference { get, .. } => fixups.register(node.id(), get(object), self.name),
        }
    }

    /// Reads the attribute of `object` from `node`. A node of the wrong kind
    /// leaves the field as it was.
    pub fn deserialize_attribute(
        &self,
        object: &mut dyn Any,
        node: NodeRef<'_>,
        slot: Slot,
        fixups: &mut DeserializeQueue,
    ) {
        match &self.access {
            Access::Value { load, .. } => load(object, node),
            Access::Reference { .. } => fixups.register(node, slot),
        }
    }

    pub(crate) fn assign_reference(&self, object: &mut dyn Any, target: Option<ObjectHandle>) {
        if let Access::Reference { set, .. } = &self.access {
            set(object, target);
        }
    }
}

pub struct StructType {
    name: &'static str,
    description: &'static str,
    rust_type: &'static str,
    super_class: Option<Superclass>,
    attributes: Vec<Attribute>,
    is_abstract: bool,
    factory: fn() -> Box<dyn Any>,
}

impl StructType {
    pub fn builder<T: Any + Default>(name: &'static str) -> StructTypeBuilder<T> {
        StructTypeBuilder {
            ty: StructType {
                name,
                description: "",
                rust_type: std::any::type_name::<T>(),
                super_class: None,
                attributes: Vec::new(),
                is_abstract: false,
                factory: make::<T>,
            },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn rust_type(&self) -> &'static str {
        self.rust_type
    }

    pub fn super_type(&self) -> Option<&'static StructType> {
        self.super_class.as_ref().map(|s| s.ty)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// This type followed by its superclasses, leaf to root.
    pub fn ancestors(&self) -> impl Iterator<Item = &StructType> {
        std::iter::successors(Some(self), |ty| ty.super_type())
    }

    /// True if `self` is `other` or derives from it.
    pub fn is_a(&self, other: &StructType) -> bool {
        self.ancestors().any(|ty| std::ptr::eq(ty, other))
    }

    /// Capability check for an object whose dynamic type is `self`: returns
    /// the handle if the object can be used as a `to`.
    pub fn cast(&self, to: &StructType, object: ObjectHandle) -> Option<ObjectHandle> {
        self.is_a(to).then_some(object)
    }

    /// Creates a default instance inside `universe`. The universe entry is
    /// stamped with this descriptor before any attribute is touched.
    pub fn construct(&'static self, universe: &mut Universe) -> Result<ObjectHandle, ReliquaryError> {
        if self.is_abstract {
            return Err(ReliquaryError::AbstractType(self.name.to_string()));
        }
        Ok(universe.insert(self, (self.factory)()))
    }

    /// Drops the instance behind `object`; the handle goes stale.
    pub fn destruct(&self, universe: &mut Universe, object: ObjectHandle) -> Result<(), ReliquaryError> {
        let ty = universe
            .type_of(object)
            .ok_or(ReliquaryError::ObjectNotFound)?;
        if !std::ptr::eq(ty, self) {
            return Err(ReliquaryError::TypeMismatch {
                expected: self.name,
                found: ty.name,
            });
        }
        universe.remove(object);
        Ok(())
    }

    /// Writes superclass attributes, then own attributes, then the class name.
    pub fn serialize(&self, object: &dyn Any, node: &mut NodeMut<'_>, fixups: &mut SerializeQueue) {
        if let Some(super_class) = &self.super_class {
            if let Some(base) = (super_class.view)(object) {
                super_class.ty.serialize(base, node, fixups);
            }
        }

        for attribute in &self.attributes {
            attribute.serialize_attribute(object, &mut node.index(attribute.name), fixups);
        }
        node.index(CLASS_KEY).set(self.name);
    }

    /// Reads superclass attributes, then own attributes. Keys that are missing
    /// leave the constructed defaults in place; unknown keys are ignored.
    pub fn deserialize(
        &'static self,
        object: &mut dyn Any,
        owner: ObjectHandle,
        node: NodeRef<'_>,
        fixups: &mut DeserializeQueue,
    ) {
        if let Some(super_class) = &self.super_class {
            if let Some(base) = (super_class.view_mut)(object) {
                super_class.ty.deserialize(base, owner, node, fixups);
            }
        }

        for attribute in &self.attributes {
            let slot = Slot {
                owner,
                declaring: self,
                attribute,
            };
            attribute.deserialize_attribute(object, node.index(attribute.name), slot, fixups);
        }
    }

    pub(crate) fn super_view<'a>(
        &self,
        object: &'a dyn Any,
    ) -> Option<(&'static StructType, &'a dyn Any)> {
        let super_class = self.super_class.as_ref()?;
        Some((super_class.ty, (super_class.view)(object)?))
    }

    pub(crate) fn super_view_mut<'a>(
        &self,
        object: &'a mut dyn Any,
    ) -> Option<(&'static StructType, &'a mut dyn Any)> {
        let super_class = self.super_class.as_ref()?;
        Some((super_class.ty, (super_class.view_mut)(object)?))
    }
}

impl std::fmt::Debug for StructType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructType")
            .field("name", &self.name)
            .field("super_type", &self.super_type().map(StructType::name))
            .field(
                "attributes",
                &self.attributes.iter().map(Attribute::name).collect::<Vec<_>>(),
            )
            .field("is_abstract", &self.is_abstract)
            .finish()
    }
}

pub struct StructTypeBuilder<T> {
    ty: StructType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Default> StructTypeBuilder<T> {
    pub fn description(mut self, description: &'static str) -> Self {
        self.ty.description = description;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.ty.is_abstract = true;
        self
    }

    /// Declares `super_type` as the superclass, embedded in `T` at the field
    /// the two projections reach.
    pub fn extends<S: Any>(
        mut self,
        super_type: &'static StructType,
        view: fn(&T) -> &S,
        view_mut: fn(&mut T) -> &mut S,
    ) -> Self {
        self.ty.super_class = Some(Superclass {
            ty: super_type,
            view: view_fn(move |object| {
                object
                    .downcast_ref::<T>()
                    .map(|t| view(t) as &dyn Any)
            }),
            view_mut: view_mut_fn(move |object| {
                object
                    .downcast_mut::<T>()
                    .map(|t| view_mut(t) as &mut dyn Any)
            }),
        });
        self
    }

    pub fn field<V>(
        mut self,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self
    where
        V: FromNode + ToNode + 'static,
    {
        let save = save_fn(move |object, node| {
            if let Some(t) = object.downcast_ref::<T>() {
                node.set(get(t));
            }
        });
        let load = load_fn(move |object, node| {
            if let (Some(t), Some(value)) = (object.downcast_mut::<T>(), V::from_node(node)) {
                *get_mut(t) = value;
            }
        });

        self.ty.attributes.push(Attribute {
            name,
            ty: AttributeType::Value(std::any::type_name::<V>()),
            access: Access::Value { save, load },
        });
        self
    }

    /// Declares a link to an object of type `target` (or a descendant).
    pub fn reference(
        mut self,
        name: &'static str,
        target: fn() -> &'static StructType,
        get: fn(&T) -> &Option<ObjectHandle>,
        get_mut: fn(&mut T) -> &mut Option<ObjectHandle>,
    ) -> Self {
        let get_ref: GetRefFn = Box::new(move |object: &dyn Any| {
            object.downcast_ref::<T>().and_then(|t| *get(t))
        });
        let set_ref: SetRefFn = Box::new(move |object: &mut dyn Any, value: Option<ObjectHandle>| {
            if let Some(t) = object.downcast_mut::<T>() {
                *get_mut(t) = value;
            }
        });

        self.ty.attributes.push(Attribute {
            name,
            ty: AttributeType::Reference(target),
            access: Access::Reference {
                get: get_ref,
                set: set_ref,
            },
        });
        self
    }

    pub fn build(self) -> StructType {
        self.ty
    }
}

/// Class-name lookup used when loading a graph.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<&'static str, &'static StructType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: &'static StructType) -> Result<(), ReliquaryError> {
        if self.types.contains_key(ty.name()) {
            return Err(ReliquaryError::DuplicateType(ty.name().to_string()));
        }
        self.types.insert(ty.name(), ty);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&'static StructType> {
        self.types.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
