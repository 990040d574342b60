//! Lossy integer codec.
//!
//! Values are multiplied by the scale factor, rounded to `i32`, delta-encoded
//! against their predecessor, zigzag-mapped and bit-packed. NaN is stored as
//! [`NAN_SENTINEL`], which rounded values never reach.

use super::bitpack;
use crate::error::{Result, StoreError};

/// Reserved integer for NaN.
pub const NAN_SENTINEL: i32 = i32::MAX;

const MIN_QUANTIZED: f64 = (i32::MIN + 1) as f64;
const MAX_QUANTIZED: f64 = (i32::MAX - 1) as f64;

#[inline]
fn quantize(value: f32, scale: f32) -> i32 {
    if value.is_nan() {
        return NAN_SENTINEL;
    }
    (value as f64 * scale as f64)
        .round()
        .clamp(MIN_QUANTIZED, MAX_QUANTIZED) as i32
}

#[inline]
fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

#[inline]
fn unzigzag(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

/// Compress one chunk.
///
/// Scaled values outside `[i32::MIN + 1, i32::MAX - 1]`, including infinities,
/// saturate at those bounds and decode as large finite values. Only NaN maps to
/// [`NAN_SENTINEL`]. Callers storing unbounded data should use the lossless
/// codec.
pub fn compress(values: &[f32], scale: f32) -> Vec<u8> {
    let mut previous = 0i32;
    let deltas: Vec<u32> = values
        .iter()
        .map(|&v| {
            let q = quantize(v, scale);
            let delta = q.wrapping_sub(previous);
            previous = q;
            zigzag(delta)
        })
        .collect();

    let mut out = Vec::with_capacity(values.len() + values.len() / bitpack::FRAME_LEN + 1);
    bitpack::pack(&deltas, &mut out);
    out
}

/// Decompress one chunk of `count` values.
pub fn decompress(bytes: &[u8], count: usize, scale: f32) -> Result<Vec<f32>> {
    let (deltas, used) = bitpack::unpack(bytes, count)?;
    if used != bytes.len() {
        return Err(StoreError::corrupt(format!(
            "{} trailing bytes after {} values",
            bytes.len() - used,
            count
        )));
    }

    let mut previous = 0i32;
    Ok(deltas
        .into_iter()
        .map(|d| {
            let q = previous.wrapping_add(unzigzag(d));
            previous = q;
            if q == NAN_SENTINEL {
                f32::NAN
            } else {
                (q as f64 / scale as f64) as f32
            }
        })
        .collect())
}
