//! Read-through coordinator between a backend and the block cache.
//!
//! Reads are split into block-aligned fetches. Concurrent misses for the same
//! block share one backend request: the first caller spawns the fetch and
//! registers it as in flight, later callers await the same shared future.
//! The fetch runs as its own task, so it completes and populates the cache
//! even if every caller waiting on it is cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use tracing::{debug, instrument, warn};

use super::block_cache::{BlockCache, BlockKey};
use crate::backend::{check_range, Backend};
use crate::error::{Result, StoreError};

type SharedFetch = Shared<BoxFuture<'static, Result<Bytes>>>;
type InFlight = Arc<Mutex<HashMap<BlockKey, SharedFetch>>>;

/// A backend whose reads go through a shared [`BlockCache`].
pub struct CachedBackend<B> {
    backend: Arc<B>,
    cache: Arc<BlockCache>,
    in_flight: InFlight,
    fetches: Arc<AtomicU64>,
}

impl<B: Backend + 'static> CachedBackend<B> {
    /// Wrap `backend` so its reads are served from `cache` where possible.
    pub fn new(backend: B, cache: Arc<BlockCache>) -> Self {
        Self {
            backend: Arc::new(backend),
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.backend
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<BlockCache> {
        &self.cache
    }

    /// Number of block fetches issued to the backend.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    fn key_for_block(&self, block: u64) -> BlockKey {
        BlockKey::new(self.backend.cache_key(), block)
    }

    /// Get one block, from the cache or the backend.
    async fn block(&self, block: u64) -> Result<Bytes> {
        let key = self.key_for_block(block);
        if let Some(bytes) = self.cache.get(key) {
            return Ok(bytes);
        }
        match self.fetch_shared(block, key).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_transient() => {
                warn!(block, error = %e, "Block fetch failed, retrying once");
                self.fetch_shared(block, key).await
            }
            Err(e) => Err(e),
        }
    }

    /// Join the in-flight fetch for `key`, or start one.
    fn fetch_shared(&self, block: u64, key: BlockKey) -> BoxFuture<'static, Result<Bytes>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(fetch) = in_flight.get(&key) {
            debug!(block, "Joining in-flight fetch");
            return fetch.clone().boxed();
        }
        // A fetch may have completed between the cache miss and taking the lock.
        if let Some(bytes) = self.cache.peek(key) {
            return futures::future::ready(Ok(bytes)).boxed();
        }

        let block_size = self.cache.block_size();
        let offset = block * block_size;
        let length = block_size.min(self.backend.len() - offset);
        let backend = Arc::clone(&self.backend);
        let cache = Arc::clone(&self.cache);
        let registry = Arc::clone(&self.in_flight);
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::spawn(async move {
            let result = backend.read(offset, length).await;
            if let Ok(bytes) = &result {
                if let Err(e) = cache.set(key, bytes) {
                    warn!(block, error = %e, "Failed to cache block");
                }
            }
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
            result
        });

        let shared = async move {
            handle
                .await
                .map_err(|e| StoreError::backend(format!("block fetch task failed: {}", e)))?
        }
        .boxed()
        .shared();
        in_flight.insert(key, shared.clone());
        shared.boxed()
    }
}

#[async_trait]
impl<B: Backend + 'static> Backend for CachedBackend<B> {
    #[instrument(skip(self))]
    async fn read(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.backend.len())?;
        if length == 0 {
            return Ok(Bytes::new());
        }

        let block_size = self.cache.block_size();
        let first = offset / block_size;
        let last = (offset + length - 1) / block_size;
        let skip = (offset - first * block_size) as usize;

        if let Some(run) = self.cache.get_many(self.key_for_block(first), last - first + 1) {
            return Ok(run.slice(skip..skip + length as usize));
        }

        let blocks = try_join_all((first..=last).map(|b| self.block(b))).await?;
        let mut out = BytesMut::with_capacity(length as usize);
        let mut remaining = length as usize;
        for (i, block) in blocks.iter().enumerate() {
            let start = if i == 0 { skip } else { 0 };
            let take = remaining.min(block.len() - start);
            out.extend_from_slice(&block[start..start + take]);
            remaining -= take;
        }
        Ok(out.freeze())
    }

    fn len(&self) -> u64 {
        self.backend.len()
    }

    fn cache_key(&self) -> u64 {
        self.backend.cache_key()
    }
}
