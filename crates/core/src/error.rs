//! Error types for presentation package editing.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, editing or saving a presentation package.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open, read or write the underlying file or stream.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// An edge would break the single-owner rule or reuse a relationship id.
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    /// A relationship id, part handle or slide does not resolve.
    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    /// A slide number, insert position or series index is out of bounds.
    #[error("Index {index} is out of range {min}..={max}")]
    IndexRange { index: usize, min: usize, max: usize },

    /// Neither a cached value nor a formula is present.
    #[error("Missing value: {0}")]
    MissingValue(String),

    /// A formula is present but its data source, sheet or cell cannot be reached.
    #[error("Cannot resolve formula '{formula}': {reason}")]
    UnresolvableFormula { formula: String, reason: String },

    /// A slide's dependency closure contains a part that cannot be cloned.
    #[error("Unsupported part kind in copy closure: {0}")]
    UnsupportedPartKind(String),

    /// Every id of a scope has been handed out.
    #[error("No {0} ids left")]
    IdsExhausted(&'static str),

    /// ZIP container error.
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing or serialization error.
    #[error("XML error: {0}")]
    XmlError(String),

    /// The package structure is invalid and will not be repaired.
    #[error("Invalid or corrupted package: {0}")]
    CorruptedPackage(String),
}

impl Error {
    /// Build an [`Error::IndexRange`] for a value outside `min..=max`.
    pub fn index_range(index: usize, min: usize, max: usize) -> Self {
        Error::IndexRange { index, min, max }
    }

    pub(crate) fn unresolvable(formula: &str, reason: impl Into<String>) -> Self {
        Error::UnresolvableFormula {
            formula: formula.to_string(),
            reason: reason.into(),
        }
    }
}
