//! In-memory backend.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use super::{check_range, Backend};
use crate::error::Result;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Backend over an owned buffer.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Bytes,
    key: u64,
}

impl MemoryBackend {
    /// Wrap a buffer, assigning it a process-unique cache key.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_key(data, NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a buffer with an explicit cache key.
    pub fn with_key(data: impl Into<Bytes>, key: u64) -> Self {
        Self {
            data: data.into(),
            key,
        }
    }

    /// The underlying buffer.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.len())?;
        Ok(self
            .data
            .slice(offset as usize..(offset + length) as usize))
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn cache_key(&self) -> u64 {
        self.key
    }
}
