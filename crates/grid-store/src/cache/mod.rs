//! Remote block cache.
//!
//! [`BlockCache`] is a fixed-size, direct-mapped store of byte blocks shared
//! by every reader in the process. [`CachedBackend`] puts it in front of a
//! [`Backend`](crate::backend::Backend), deduplicating concurrent fetches.

mod block_cache;
mod coordinator;

pub use block_cache::{block_key, BlockCache, BlockKey};
pub use coordinator::CachedBackend;
