//! Shared test utilities for the grid-store workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Series data generators with predictable values
//! - Common store shapes and scale factors
//! - Temporary directory helpers
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{create_index_grid, fixtures::shapes};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use generators::*;
pub use paths::*;
