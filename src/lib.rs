pub mod archive;
pub mod codec;
pub mod error;
pub mod fixup;
pub mod pass;
pub mod path;
pub mod storage;
pub mod struct_type;
pub mod universe;
pub mod value;

pub use archive::{Archive, NodeId, NodeKind, NodeMut, NodeRef, NodeValue};
pub use error::ReliquaryError;
pub use fixup::Diagnostic;
pub use pass::PassReport;
pub use struct_type::{StructType, TypeRegistry};
pub use universe::{ObjectHandle, Universe};
