//! Registry of live objects and their stable string identifiers.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::error::ReliquaryError;
use crate::struct_type::StructType;

static NEXT_UNIVERSE: AtomicU64 = AtomicU64::new(1);

/// Handle to an object owned by a [`Universe`].
///
/// Handles are stamped with the owning universe and a slot generation, so a
/// handle to a destroyed object, or one from another universe, never resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    universe: u64,
    index: u32,
    generation: u32,
}

struct Entry {
    ty: &'static StructType,
    identifier: Option<String>,
    object: Box<dyn Any>,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

pub struct Universe {
    id: u64,
    slots: Vec<Slot>,
    free: Vec<u32>,
    identifiers: HashMap<String, ObjectHandle>,
}

impl Universe {
    pub fn new() -> Self {
        Self {
            id: NEXT_UNIVERSE.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            identifiers: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entry(handle).is_some()
    }

    /// Live handles in slot order.
    pub fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|_| ObjectHandle {
                universe: self.id,
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    pub fn type_of(&self, handle: ObjectHandle) -> Option<&'static StructType> {
        self.entry(handle).map(|entry| entry.ty)
    }

    pub fn get_object(&self, identifier: &str) -> Option<ObjectHandle> {
        self.identifiers
            .get(identifier)
            .copied()
            .filter(|handle| self.contains(*handle))
    }

    /// Identifier of `handle` if one has been assigned.
    pub fn identifier(&self, handle: ObjectHandle) -> Option<&str> {
        self.entry(handle)
            .and_then(|entry| entry.identifier.as_deref())
    }

    /// Identifier of `handle`, assigning a fresh uuid on first request.
    pub fn get_id(&mut self, handle: ObjectHandle) -> Option<String> {
        let entry = self.entry_mut(handle)?;
        if let Some(identifier) = &entry.identifier {
            return Some(identifier.clone());
        }

        let identifier = Uuid::new_v4().to_string();
        entry.identifier = Some(identifier.clone());
        self.identifiers.insert(identifier.clone(), handle);
        Some(identifier)
    }

    pub fn set_id(&mut self, handle: ObjectHandle, identifier: &str) -> Result<(), ReliquaryError> {
        if !self.contains(handle) {
            return Err(ReliquaryError::ObjectNotFound);
        }
        if let Some(existing) = self.get_object(identifier) {
            if existing == handle {
                return Ok(());
            }
            return Err(ReliquaryError::DuplicateIdentifier(identifier.to_string()));
        }

        let entry = self.entry_mut(handle).ok_or(ReliquaryError::ObjectNotFound)?;
        let previous = entry.identifier.replace(identifier.to_string());
        if let Some(previous) = previous {
            self.identifiers.remove(&previous);
        }
        self.identifiers.insert(identifier.to_string(), handle);
        Ok(())
    }

    /// `handle` if its object is a `to` or a descendant of it.
    pub fn cast(&self, handle: ObjectHandle, to: &StructType) -> Option<ObjectHandle> {
        self.type_of(handle)?.cast(to, handle)
    }

    /// The object viewed as `T`, which may be its own type or any ancestor's.
    pub fn get<T: Any>(&self, handle: ObjectHandle) -> Option<&T> {
        let entry = self.entry(handle)?;
        let mut ty = entry.ty;
        let mut object: &dyn Any = entry.object.as_ref();
        loop {
            if let Some(found) = object.downcast_ref::<T>() {
                return Some(found);
            }
            (ty, object) = ty.super_view(object)?;
        }
    }

    pub fn get_mut<T: Any>(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        let entry = self.entry_mut(handle)?;
        let mut ty = entry.ty;
        let mut object: &mut dyn Any = entry.object.as_mut();
        loop {
            if object.is::<T>() {
                return object.downcast_mut::<T>();
            }
            (ty, object) = ty.super_view_mut(object)?;
        }
    }

    pub(crate) fn object(&self, handle: ObjectHandle) -> Option<(&'static StructType, &dyn Any)> {
        self.entry(handle)
            .map(|entry| (entry.ty, entry.object.as_ref()))
    }

    pub(crate) fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut dyn Any> {
        self.entry_mut(handle).map(|entry| entry.object.as_mut())
    }

    /// The part of the object declared by `ty`, found by walking up from the
    /// object's own type.
    pub(crate) fn view_as_mut(
        &mut self,
        handle: ObjectHandle,
        ty: &StructType,
    ) -> Option<&mut dyn Any> {
        let entry = self.entry_mut(handle)?;
        let mut current = entry.ty;
        let mut object: &mut dyn Any = entry.object.as_mut();
        while !std::ptr::eq(current, ty) {
            (current, object) = current.super_view_mut(object)?;
        }
        Some(object)
    }

    pub(crate) fn insert(&mut self, ty: &'static StructType, object: Box<dyn Any>) -> ObjectHandle {
        let entry = Entry {
            ty,
            identifier: None,
            object,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return ObjectHandle {
                universe: self.id,
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        ObjectHandle {
            universe: self.id,
            index,
            generation: 0,
        }
    }

    pub(crate) fn remove(&mut self, handle: ObjectHandle) -> Option<Box<dyn Any>> {
        self.entry(handle)?;
        let slot = &mut self.slots[handle.index as usize];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        if let Some(identifier) = entry.identifier {
            self.identifiers.remove(&identifier);
        }
        Some(entry.object)
    }

    fn entry(&self, handle: ObjectHandle) -> Option<&Entry> {
        if handle.universe != self.id {
            return None;
        }
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: ObjectHandle) -> Option<&mut Entry> {
        if handle.universe != self.id {
            return None;
        }
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}
