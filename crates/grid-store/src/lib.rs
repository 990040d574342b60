//! Chunked, compressed 2-D array store with a remote block cache
//!
//! A store holds one `f32` array with a location axis (dim0) and a time
//! axis (dim1), split into fixed-size chunks that are compressed one at a
//! time. It enables:
//!
//! - **Partial reads**: Only the chunks intersecting a request are fetched
//!   and decompressed
//! - **Remote access**: Stores are read by byte range from memory, local
//!   files, HTTP servers or object storage
//! - **Shared caching**: A direct-mapped block cache deduplicates concurrent
//!   remote fetches across readers
//!
//! # Architecture
//!
//! ```text
//! Ingestion
//!      │
//!      ▼
//! StoreWriter::write_all / write_chunk_row
//!      │
//!      ├─► Compress each chunk (lossy integer or lossless float)
//!      │
//!      └─► finish(): header ─► chunk directory ─► payloads
//!               │
//!               ▼
//!          path / anonymous file / Bytes
//!
//! API request
//!      │
//!      ▼
//! StoreReader::read(dim0, dim1)
//!      │
//!      ├─► Calculate needed chunks (O(1) arithmetic)
//!      │
//!      ├─► Fetch chunk bytes from the Backend
//!      │         │
//!      │         └─► CachedBackend: BlockCache hit, or one shared fetch
//!      │
//!      └─► Decompress and copy into the output (NaN where uncovered)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_store::{CompressionKind, Dimensions, StoreReader, StoreWriter};
//!
//! let dims = Dimensions::new(1, 25, 1, 10)?;
//! let mut writer = StoreWriter::new(dims, CompressionKind::LossyInteger, 20.0)?;
//! writer.write_all(&values)?;
//! let store = writer.finish()?;
//!
//! let reader = StoreReader::open(store.into_backend()).await?;
//! let series = reader.read(0..1, 5..15).await?;
//! ```

pub mod backend;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod reader;
pub mod types;
pub mod writer;

// Re-export commonly used types at crate root
pub use backend::{
    Backend, FileBackend, HttpBackend, MemoryBackend, MinioConfig, ObjectStoreBackend,
};
pub use cache::{BlockCache, BlockKey, CachedBackend};
pub use config::{HttpBackendConfig, StoreConfig};
pub use error::{Result, StoreError};
pub use reader::{hermite_resample, GridPoint, StoreReader};
pub use types::{CacheStats, ChunkEntry, CompressionKind, Dimensions};
pub use writer::{FinishedStore, StoreWriter, WriteSummary};
