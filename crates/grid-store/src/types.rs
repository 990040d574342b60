//! Core types for the grid store.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::format::{ENTRY_SIZE, HEADER_SIZE};

/// Extents of a two-dimensional store and of its chunks.
///
/// dim0 is the location axis, dim1 the time axis. Data is row-major: all of
/// dim1 for location 0, then location 1, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of elements along dim0.
    pub dim0: u64,
    /// Number of elements along dim1.
    pub dim1: u64,
    /// Chunk extent along dim0.
    pub chunk0: u64,
    /// Chunk extent along dim1.
    pub chunk1: u64,
}

impl Dimensions {
    /// Create a new descriptor.
    ///
    /// Chunk extents must be non-zero, and the element count as well as the
    /// whole header plus chunk directory must be addressable.
    pub fn new(dim0: u64, dim1: u64, chunk0: u64, chunk1: u64) -> Result<Self> {
        if chunk0 == 0 || chunk1 == 0 {
            return Err(StoreError::InvalidDimensions(format!(
                "chunk extents must be > 0, got {}x{}",
                chunk0, chunk1
            )));
        }
        let elements = dim0
            .checked_mul(dim1)
            .filter(|&n| usize::try_from(n).is_ok());
        let directory_end = dim0
            .div_ceil(chunk0)
            .checked_mul(dim1.div_ceil(chunk1))
            .and_then(|chunks| chunks.checked_mul(ENTRY_SIZE))
            .and_then(|size| size.checked_add(HEADER_SIZE))
            .filter(|&end| usize::try_from(end).is_ok());
        if elements.is_none() || directory_end.is_none() {
            return Err(StoreError::InvalidDimensions(format!(
                "{}x{} with {}x{} chunks is too large to address",
                dim0, dim1, chunk0, chunk1
            )));
        }
        Ok(Self {
            dim0,
            dim1,
            chunk0,
            chunk1,
        })
    }

    /// Total number of elements.
    pub fn len(&self) -> u64 {
        self.dim0 * self.dim1
    }

    /// Check if the store holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunks along (dim0, dim1).
    pub fn num_chunks(&self) -> (u64, u64) {
        (
            self.dim0.div_ceil(self.chunk0),
            self.dim1.div_ceil(self.chunk1),
        )
    }

    /// Total number of chunks.
    pub fn chunk_count(&self) -> u64 {
        let (n0, n1) = self.num_chunks();
        n0 * n1
    }
}

/// Compression scheme used for every chunk of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionKind {
    /// Scale, round, delta and bit-pack into integers. Lossy.
    #[default]
    LossyInteger,
    /// XOR delta over float bit patterns. Bit-exact.
    LosslessFloat,
}

impl CompressionKind {
    /// On-disk tag.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::LossyInteger => 0,
            Self::LosslessFloat => 1,
        }
    }

    /// Parse the on-disk tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::LossyInteger),
            1 => Some(Self::LosslessFloat),
            _ => None,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LossyInteger => "lossy_integer",
            Self::LosslessFloat => "lossless_float",
        }
    }
}

impl std::fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Location of one compressed chunk inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub offset: u64,
    pub length: u64,
}

impl ChunkEntry {
    /// Byte offset one past the end of the chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Statistics about the block cache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
