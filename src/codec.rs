//! Byte encodings of the value tree.
//!
//! The tree itself is format-agnostic; a [`Codec`] turns bytes into a fresh
//! [`Archive`] and writes any subtree back out.

use std::io::Write;

use sha2::{Digest, Sha256};

use crate::archive::{Archive, NodeKind, NodeMut, NodeRef, NodeValue};
use crate::error::ReliquaryError;

pub const FILE_MAGIC: &[u8; 4] = b"RLQA";
pub const FORMAT_VERSION: u32 = 1;

/// Deepest container nesting either codec accepts, the same limit serde_json
/// applies when parsing.
pub const MAX_DEPTH: usize = 128;

const TAG_EMPTY: u8 = 0x00;
const TAG_INTEGER: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;
const TAG_STRING: u8 = 0x03;
const TAG_ARRAY: u8 = 0x04;
const TAG_MAP: u8 = 0x05;

pub trait Codec {
    fn encode(&self, node: NodeRef<'_>, sink: &mut dyn Write) -> Result<(), ReliquaryError>;
    fn decode(&self, bytes: &[u8]) -> Result<Archive, ReliquaryError>;
}

/// JSON text encoding.
///
/// Integers are written as signed 64-bit values. A JSON integer above
/// `i64::MAX` is kept bit-exactly, so it reads back as the same `u64` but is
/// written out again as a negative number.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pub pretty: bool,
}

impl JsonCodec {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn to_json(node: NodeRef<'_>) -> Result<serde_json::Value, ReliquaryError> {
        Self::to_json_at(node, 0)
    }

    fn to_json_at(node: NodeRef<'_>, depth: usize) -> Result<serde_json::Value, ReliquaryError> {
        use serde_json::Value as Json;

        if depth > MAX_DEPTH {
            return Err(too_deep());
        }
        Ok(match node.value() {
            None | Some(NodeValue::Empty) => Json::Null,
            Some(NodeValue::Integer(n)) => Json::from(*n),
            Some(NodeValue::Float(f)) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .ok_or(ReliquaryError::NonFiniteFloat(*f))?,
            Some(NodeValue::String(s)) => Json::String(s.clone()),
            Some(NodeValue::Array(_)) => Json::Array(
                node.elements()
                    .map(|item| Self::to_json_at(item, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(NodeValue::Map(_)) => {
                let mut object = serde_json::Map::new();
                for (key, child) in node.entries() {
                    object.insert(key.to_string(), Self::to_json_at(child, depth + 1)?);
                }
                Json::Object(object)
            }
        })
    }

    pub fn fill(value: &serde_json::Value, node: &mut NodeMut<'_>) {
        use serde_json::Value as Json;

        match value {
            Json::Null => node.clear(),
            Json::Bool(b) => node.set(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    node.set(i);
                } else if let Some(u) = n.as_u64() {
                    node.set(u);
                } else if let Some(f) = n.as_f64() {
                    node.set(f);
                }
            }
            Json::String(s) => node.set(s.as_str()),
            Json::Array(items) => {
                node.clear_to(NodeKind::Array);
                for item in items {
                    Self::fill(item, &mut node.push());
                }
            }
            Json::Object(entries) => {
                node.clear_to(NodeKind::Map);
                for (key, item) in entries {
                    Self::fill(item, &mut node.index(key));
                }
            }
        }
    }
}

impl Codec for JsonCodec {
    fn encode(&self, node: NodeRef<'_>, sink: &mut dyn Write) -> Result<(), ReliquaryError> {
        let json = Self::to_json(node)?;
        if self.pretty {
            serde_json::to_writer_pretty(&mut *sink, &json)?;
        } else {
            serde_json::to_writer(&mut *sink, &json)?;
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Archive, ReliquaryError> {
        let json: serde_json::Value = serde_json::from_slice(bytes)?;
        let mut archive = Archive::new();
        Self::fill(&json, &mut archive.root_mut());
        Ok(archive)
    }
}

/// Tagged big-endian binary format behind a magic/version header.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// Canonical body encoding. Map entries follow key order, so equal trees
    /// produce equal bytes whatever their arena layout.
    pub fn write_canonical(buf: &mut Vec<u8>, node: NodeRef<'_>) {
        match node.value() {
            None | Some(NodeValue::Empty) => buf.push(TAG_EMPTY),
            Some(NodeValue::Integer(n)) => {
                buf.push(TAG_INTEGER);
                buf.extend_from_slice(&n.to_be_bytes());
            }
            Some(NodeValue::Float(f)) => {
                buf.push(TAG_FLOAT);
                buf.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Some(NodeValue::String(s)) => {
                buf.push(TAG_STRING);
                Self::write_bytes(buf, s.as_bytes());
            }
            Some(NodeValue::Array(items)) => {
                buf.push(TAG_ARRAY);
                buf.extend_from_slice(&(items.len() as u64).to_be_bytes());
                for item in node.elements() {
                    Self::write_canonical(buf, item);
                }
            }
            Some(NodeValue::Map(entries)) => {
                buf.push(TAG_MAP);
                buf.extend_from_slice(&(entries.len() as u64).to_be_bytes());
                for (key, child) in node.entries() {
                    Self::write_bytes(buf, key.as_bytes());
                    Self::write_canonical(buf, child);
                }
            }
        }
    }

    fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
        buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
        buf.extend_from_slice(bytes);
    }

    fn read_node(
        reader: &mut Reader<'_>,
        node: &mut NodeMut<'_>,
        depth: usize,
    ) -> Result<(), ReliquaryError> {
        if depth > MAX_DEPTH {
            return Err(too_deep());
        }
        match reader.u8()? {
            TAG_EMPTY => node.clear(),
            TAG_INTEGER => node.set(i64::from_be_bytes(reader.array()?)),
            TAG_FLOAT => node.set(f64::from_bits(u64::from_be_bytes(reader.array()?))),
            TAG_STRING => node.set(reader.string()?),
            TAG_ARRAY => {
                let count = reader.count()?;
                node.clear_to(NodeKind::Array);
                for _ in 0..count {
                    Self::read_node(reader, &mut node.push(), depth + 1)?;
                }
            }
            TAG_MAP => {
                let count = reader.count()?;
                node.clear_to(NodeKind::Map);
                let mut previous: Option<String> = None;
                for _ in 0..count {
                    let key = reader.string()?;
                    if previous.as_ref().is_some_and(|p| *p >= key) {
                        return Err(ReliquaryError::MalformedFileStructure(format!(
                            "map key {key:?} out of order"
                        )));
                    }
                    Self::read_node(reader, &mut node.index(&key), depth + 1)?;
                    previous = Some(key);
                }
            }
            tag => {
                return Err(ReliquaryError::MalformedFileStructure(format!(
                    "unknown node tag {tag:#04x}"
                )));
            }
        }
        Ok(())
    }
}

impl Codec for BinaryCodec {
    fn encode(&self, node: NodeRef<'_>, sink: &mut dyn Write) -> Result<(), ReliquaryError> {
        let mut buf = Vec::new();
        buf.extend_from_slice(FILE_MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        Self::write_canonical(&mut buf, node);
        sink.write_all(&buf)?;
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Archive, ReliquaryError> {
        if bytes.len() < FILE_MAGIC.len() || &bytes[..FILE_MAGIC.len()] != FILE_MAGIC {
            return Err(ReliquaryError::InvalidFileMagic);
        }

        let mut reader = Reader {
            bytes,
            pos: FILE_MAGIC.len(),
        };
        let version = reader
            .array()
            .map(u32::from_be_bytes)
            .map_err(|_| ReliquaryError::MissingFormatVersion)?;
        if version != FORMAT_VERSION {
            return Err(ReliquaryError::UnsupportedFormatVersion(version));
        }

        let mut archive = Archive::new();
        Self::read_node(&mut reader, &mut archive.root_mut(), 0)?;
        if reader.pos != bytes.len() {
            return Err(ReliquaryError::MalformedFileStructure(
                "trailing bytes after root node".to_string(),
            ));
        }
        Ok(archive)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], ReliquaryError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                ReliquaryError::MalformedFileStructure("unexpected end of input".to_string())
            })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ReliquaryError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ReliquaryError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Element count; every element takes at least one byte, so anything
    /// larger than the remaining input is corrupt.
    fn count(&mut self) -> Result<usize, ReliquaryError> {
        let count = u64::from_be_bytes(self.array()?);
        let remaining = (self.bytes.len() - self.pos) as u64;
        if count > remaining {
            return Err(ReliquaryError::MalformedFileStructure(format!(
                "element count {count} exceeds input"
            )));
        }
        Ok(count as usize)
    }

    fn string(&mut self) -> Result<String, ReliquaryError> {
        let len = u64::from_be_bytes(self.array()?);
        let len = usize::try_from(len).map_err(|_| {
            ReliquaryError::MalformedFileStructure(format!("string length {len} too large"))
        })?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ReliquaryError::MalformedFileStructure(e.to_string()))
    }
}

fn too_deep() -> ReliquaryError {
    ReliquaryError::MalformedFileStructure(format!("nesting too deep (limit {MAX_DEPTH})"))
}

/// SHA-256 over the canonical encoding of `node`.
pub fn digest(node: NodeRef<'_>) -> [u8; 32] {
    let mut bytes = Vec::new();
    BinaryCodec::write_canonical(&mut bytes, node);

    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
