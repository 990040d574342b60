//! Interpolation on decompressed series.
//!
//! Any NaN among the contributing inputs makes the result NaN; missing data
//! is never blended as zero.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Fractional location on a 2-D grid flattened into dim0 as `y * nx + x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: u64,
    /// Offset towards `x + 1`, in `[0, 1)`.
    pub x_fraction: f32,
    pub y: u64,
    /// Offset towards `y + 1`, in `[0, 1)`.
    pub y_fraction: f32,
    /// Grid width.
    pub nx: u64,
}

/// Clamp `index` so that `index` and `index + 1` both lie in `[0, count)`.
///
/// At the far edge the pair becomes `(count - 2, count - 1)` with the
/// fraction forced to 1. An axis of a single element yields `(0, 0.0)` and
/// the caller reads that element twice.
pub fn clamp_pair(index: u64, fraction: f32, count: u64) -> (u64, f32) {
    if count < 2 {
        (0, 0.0)
    } else if index > count - 2 {
        (count - 2, 1.0)
    } else {
        (index, fraction)
    }
}

/// Linear blend of two values.
pub fn linear(a: f32, b: f32, fraction: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        return f32::NAN;
    }
    a * (1.0 - fraction) + b * fraction
}

/// Bilinear blend of four corner values.
pub fn bilinear(v00: f32, v10: f32, v01: f32, v11: f32, xf: f32, yf: f32) -> f32 {
    // Handle NaN values - if any corner is NaN, return NaN
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    if p0.is_nan() || p1.is_nan() || p2.is_nan() || p3.is_nan() {
        return f32::NAN;
    }

    let t2 = t * t;
    let t3 = t2 * t;

    // Catmull-Rom coefficients
    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

/// Resample series along dim1 at fractional positions.
///
/// `values` holds consecutive series of `dim1_len` elements each. For every
/// series the output holds one value per entry of `positions`, where
/// position `2.5` lies halfway between elements 2 and 3. Neighbours outside
/// the series are clamped to its first and last element.
pub fn hermite_resample(values: &[f32], dim1_len: usize, positions: &[f32]) -> Result<Vec<f32>> {
    if dim1_len == 0 {
        return if values.is_empty() {
            Ok(Vec::new())
        } else {
            Err(StoreError::InvalidDimensions(
                "series length must be > 0".to_string(),
            ))
        };
    }
    if values.len() % dim1_len != 0 {
        return Err(StoreError::InvalidDimensions(format!(
            "{} values do not divide into series of {}",
            values.len(),
            dim1_len
        )));
    }

    let last = dim1_len as i64 - 1;
    let mut out = Vec::with_capacity(values.len() / dim1_len * positions.len());
    for series in values.chunks_exact(dim1_len) {
        let at = |i: i64| series[i.clamp(0, last) as usize];
        for &position in positions {
            if !position.is_finite() {
                out.push(f32::NAN);
                continue;
            }
            let base = position.floor();
            let t = position - base;
            let i = base as i64;
            out.push(cubic_1d(at(i - 1), at(i), at(i + 1), at(i + 2), t));
        }
    }
    Ok(out)
}
