//! Error types for the grid store.

use thiserror::Error;

/// Errors that can occur while writing, reading or caching a grid store.
///
/// The type is `Clone` so that a single failed backend fetch can be handed
/// to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A compressed chunk could not be decoded (truncated or malformed bytes).
    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    /// A byte range or directory entry lies beyond the resource.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The backend failed (I/O, connection, non range-capable server).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A streaming writer received the wrong number of elements.
    #[error("shape mismatch at chunk row {chunk_row}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        chunk_row: u64,
        expected: usize,
        actual: usize,
    },

    /// A cache slot was observed in an inconsistent state.
    #[error("cache slot {0} torn")]
    CacheSlotTorn(usize),

    /// The store header is not a valid grid store header.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Invalid dimension or chunk extents.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The writer was finalized before every chunk was written.
    #[error("incomplete store: {written} of {expected} chunk rows written")]
    Incomplete { written: u64, expected: u64 },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local I/O error on the write path.
    #[error("io error: {0}")]
    Io(String),
}

impl StoreError {
    /// Create a CorruptChunk error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptChunk(msg.into())
    }

    /// Create an OutOfRange error.
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::OutOfRange(msg.into())
    }

    /// Create a BackendUnavailable error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create an InvalidHeader error.
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    /// Attach the chunk index to a codec error.
    pub fn in_chunk(self, chunk: u64) -> Self {
        match self {
            Self::CorruptChunk(msg) => Self::CorruptChunk(format!("chunk {}: {}", chunk, msg)),
            other => other,
        }
    }

    /// Whether a retry of the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for grid store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
