use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReliquaryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid file magic")]
    InvalidFileMagic,

    #[error("Unsupported format version: {0}")]
    UnsupportedFormatVersion(u32),

    #[error("Missing format version")]
    MissingFormatVersion,

    #[error("Malformed file structure: {0}")]
    MalformedFileStructure(String),

    #[error("Non-finite float cannot be encoded: {0}")]
    NonFiniteFloat(f64),

    #[error("Cannot construct abstract type: {0}")]
    AbstractType(String),

    #[error("Object not found")]
    ObjectNotFound,

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Duplicate type: {0}")]
    DuplicateType(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}
