//! Byte-range addressable data sources.
//!
//! Everything above this layer addresses a store purely by byte offset and
//! length. A backend also exposes a stable cache key identifying the
//! resource, used by the block cache.

mod file;
mod http;
mod memory;
mod object;

pub use file::FileBackend;
pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use object::{MinioConfig, ObjectStoreBackend};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};

/// A byte-range readable resource.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`.
    async fn read(&self, offset: u64, length: u64) -> Result<Bytes>;

    /// Total size of the resource in bytes.
    fn len(&self) -> u64;

    /// Check if the resource is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable identity of the resource.
    fn cache_key(&self) -> u64;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn read(&self, offset: u64, length: u64) -> Result<Bytes> {
        (**self).read(offset, length).await
    }

    fn len(&self) -> u64 {
        (**self).len()
    }

    fn cache_key(&self) -> u64 {
        (**self).cache_key()
    }
}

/// Check that `[offset, offset + length)` lies inside a resource of `len` bytes.
pub fn check_range(offset: u64, length: u64, len: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(()),
        _ => Err(StoreError::out_of_range(format!(
            "bytes {}+{} beyond resource size {}",
            offset, length, len
        ))),
    }
}

/// Compute a cache key for a resource location (path, URL, object key).
/// Used to distinguish blocks from different stores sharing one cache.
pub fn resource_key(location: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    location.hash(&mut hasher);
    hasher.finish()
}
