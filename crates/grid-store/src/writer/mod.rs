//! Store writer.
//!
//! This module is used during ingestion to turn decoded grids into
//! chunked, compressed stores.

mod store_writer;

pub use store_writer::{FinishedStore, StoreWriter, WriteSummary};
