use std::collections::BTreeMap;

use crate::archive::{NodeKind, NodeMut, NodeRef, NodeValue};

/// Reads a Rust value out of a node. Returns `None` when the node's tag does
/// not belong to the value's family.
pub trait FromNode: Sized {
    fn from_node(node: NodeRef<'_>) -> Option<Self>;
}

/// Writes a Rust value into a node, replacing whatever the node held.
pub trait ToNode {
    fn to_node(&self, node: &mut NodeMut<'_>);
}

macro_rules! integer_node {
    ($($ty:ty),*) => {
        $(
            impl FromNode for $ty {
                fn from_node(node: NodeRef<'_>) -> Option<Self> {
                    match node.value() {
                        Some(NodeValue::Integer(n)) => Some(*n as $ty),
                        _ => None,
                    }
                }
            }

            impl ToNode for $ty {
                fn to_node(&self, node: &mut NodeMut<'_>) {
                    node.store(NodeValue::Integer(*self as i64));
                }
            }
        )*
    };
}

macro_rules! float_node {
    ($($ty:ty),*) => {
        $(
            impl FromNode for $ty {
                fn from_node(node: NodeRef<'_>) -> Option<Self> {
                    match node.value() {
                        Some(NodeValue::Float(f)) => Some(*f as $ty),
                        _ => None,
                    }
                }
            }

            impl ToNode for $ty {
                fn to_node(&self, node: &mut NodeMut<'_>) {
                    node.store(NodeValue::Float(*self as f64));
                }
            }
        )*
    };
}

integer_node!(i8, i16, i32, i64, u8, u16, u32, u64);
float_node!(f32, f64);

impl FromNode for bool {
    fn from_node(node: NodeRef<'_>) -> Option<Self> {
        match node.value() {
            Some(NodeValue::Integer(n)) => Some(*n != 0),
            _ => None,
        }
    }
}

impl ToNode for bool {
    fn to_node(&self, node: &mut NodeMut<'_>) {
        node.store(NodeValue::Integer(i64::from(*self)));
    }
}

impl FromNode for String {
    fn from_node(node: NodeRef<'_>) -> Option<Self> {
        match node.value() {
            Some(NodeValue::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

impl ToNode for String {
    fn to_node(&self, node: &mut NodeMut<'_>) {
        self.as_str().to_node(node);
    }
}

impl ToNode for str {
    fn to_node(&self, node: &mut NodeMut<'_>) {
        node.store(NodeValue::String(self.to_string()));
    }
}

impl<T: ToNode + ?Sized> ToNode for &T {
    fn to_node(&self, node: &mut NodeMut<'_>) {
        (**self).to_node(node);
    }
}

// Empty means "absent"; anything else must read as `T`.
impl<T: FromNode> FromNode for Option<T> {
    fn from_node(node: NodeRef<'_>) -> Option<Self> {
        if node.is_empty() {
            return Some(None);
        }
        T::from_node(node).map(Some)
    }
}

impl<T: ToNode> ToNode for Option<T> {
    fn to_node(&self, node: &mut NodeMut<'_>) {
        match self {
            Some(value) => value.to_node(node),
            None => node.clear(),
        }
    }
}

impl<T: FromNode> FromNode for Vec<T> {
    fn from_node(node: NodeRef<'_>) -> Option<Self> {
        if !node.is_array() {
            return None;
        }
        node.elements().map(T::from_node).collect()
    }
}

impl<T: ToNode> ToNode for [T] {
    fn to_node(&self, node: &mut NodeMut<'_>) {
        node.clear_to(NodeKind::Array);
        for item in self {
            item.to_node(&mut node.push());
        }
    }
}

impl<T: ToNode> ToNode for Vec<T> {
    fn to_node(&self, node: &mut NodeMut<'_>) {
        self.as_slice().to_node(node);
    }
}

impl<T: FromNode> FromNode for BTreeMap<String, T> {
    fn from_node(node: NodeRef<'_>) -> Option<Self> {
        if !node.is_map() {
            return None;
        }
        node.entries()
            .map(|(key, child)| T::from_node(child).map(|value| (key.to_string(), value)))
            .collect()
    }
}

impl<T: ToNode> ToNode for BTreeMap<String, T> {
    fn to_node(&self, node: &mut NodeMut<'_>) {
        node.clear_to(NodeKind::Map);
        for (key, value) in self {
            value.to_node(&mut node.index(key));
        }
    }
}
