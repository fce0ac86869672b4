//! Dotted paths (`scene.objects.0.name`) over a value tree.
//!
//! A numeric segment addresses an element when the current node is an Array;
//! every other segment is a Map key.

use crate::archive::{Archive, NodeId, NodeRef};
use crate::error::ReliquaryError;

fn segments(path: &str) -> Result<Vec<&str>, ReliquaryError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ReliquaryError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// Follows `path` without modifying anything. Missing steps read as Empty.
pub fn lookup<'a>(node: NodeRef<'a>, path: &str) -> Result<NodeRef<'a>, ReliquaryError> {
    let mut current = node;
    for segment in segments(path)? {
        current = match segment.parse::<usize>() {
            Ok(position) if current.is_array() => current.at(position),
            _ => current.index(segment),
        };
    }
    Ok(current)
}

/// Follows `path`, creating Map entries as needed. An array position may name
/// an existing element or the slot one past the end, which appends.
pub fn lookup_mut(
    archive: &mut Archive,
    start: NodeId,
    path: &str,
) -> Result<NodeId, ReliquaryError> {
    let mut current = start;
    for segment in segments(path)? {
        let mut node = archive.node_mut(current);
        current = match segment.parse::<usize>() {
            Ok(position) if node.view().is_array() => {
                let size = node.size();
                if position < size {
                    node.at(position).id()
                } else if position == size {
                    node.push().id()
                } else {
                    return Err(ReliquaryError::InvalidPath(path.to_string()));
                }
            }
            _ => node.index(segment).id(),
        };
    }
    Ok(current)
}
