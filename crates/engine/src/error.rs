use std::fmt;

/// Failures that escape the store.
///
/// Only durable-storage problems are errors. Validation rejections and stale
/// references are reported as outcomes or logged, never returned here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The persistence backend failed to read, write, or remove a document.
    Backend(String),
    /// The state could not be converted to or from its persisted form.
    Serialize(String),
    /// Filesystem error from a file-based backend.
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(msg) => write!(f, "storage backend error: {msg}"),
            Self::Serialize(msg) => write!(f, "serialization error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialize(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
