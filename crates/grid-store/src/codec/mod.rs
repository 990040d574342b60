//! Chunk codecs.
//!
//! Both codecs work on one chunk at a time and carry no state between
//! chunks. The element count is not stored in the payload; the reader
//! derives it from the chunk geometry.

mod bitpack;
pub mod float;
pub mod integer;

use crate::error::Result;
use crate::types::CompressionKind;

pub use integer::NAN_SENTINEL;

/// Compress one chunk of values.
pub fn compress(kind: CompressionKind, values: &[f32], scale_factor: f32) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::LossyInteger => Ok(integer::compress(values, scale_factor)),
        CompressionKind::LosslessFloat => float::compress(values),
    }
}

/// Decompress one chunk of `count` values.
pub fn decompress(
    kind: CompressionKind,
    bytes: &[u8],
    count: usize,
    scale_factor: f32,
) -> Result<Vec<f32>> {
    match kind {
        CompressionKind::LossyInteger => integer::decompress(bytes, count, scale_factor),
        CompressionKind::LosslessFloat => float::decompress(bytes, count),
    }
}
