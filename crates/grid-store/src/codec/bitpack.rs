//! Byte-aligned frames of bit-packed unsigned integers.
//!
//! Each frame holds up to [`FRAME_LEN`] values. It starts with one byte giving
//! the bit width of its widest value, followed by the values packed LSB-first
//! and padded to the next byte boundary.

use crate::error::{Result, StoreError};

/// Values per frame.
pub const FRAME_LEN: usize = 128;

/// Maximum supported bit width.
const MAX_WIDTH: u32 = 32;

#[inline]
fn bit_width(v: u32) -> u32 {
    u32::BITS - v.leading_zeros()
}

/// Append `values` to `out` as packed frames.
pub fn pack(values: &[u32], out: &mut Vec<u8>) {
    for frame in values.chunks(FRAME_LEN) {
        let width = frame.iter().map(|&v| bit_width(v)).max().unwrap_or(0);
        out.push(width as u8);

        let mut acc: u64 = 0;
        let mut filled = 0u32;
        for &v in frame {
            acc |= (v as u64) << filled;
            filled += width;
            while filled >= 8 {
                out.push(acc as u8);
                acc >>= 8;
                filled -= 8;
            }
        }
        if filled > 0 {
            out.push(acc as u8);
        }
    }
}

/// Unpack `count` values. Returns the values and the number of bytes consumed.
pub fn unpack(bytes: &[u8], count: usize) -> Result<(Vec<u32>, usize)> {
    let mut values = Vec::with_capacity(count);
    let mut pos = 0usize;

    while values.len() < count {
        let n = FRAME_LEN.min(count - values.len());
        let width = *bytes
            .get(pos)
            .ok_or_else(|| StoreError::corrupt(format!("truncated frame header at byte {}", pos)))?
            as u32;
        if width > MAX_WIDTH {
            return Err(StoreError::corrupt(format!("invalid bit width {}", width)));
        }
        pos += 1;

        let frame_bytes = (n * width as usize).div_ceil(8);
        let frame = bytes.get(pos..pos + frame_bytes).ok_or_else(|| {
            StoreError::corrupt(format!(
                "truncated frame: need {} bytes at {}, have {}",
                frame_bytes,
                pos,
                bytes.len().saturating_sub(pos)
            ))
        })?;
        pos += frame_bytes;

        let mask = (1u64 << width) - 1;
        let mut acc: u64 = 0;
        let mut filled = 0u32;
        let mut next = 0usize;
        for _ in 0..n {
            while filled < width {
                acc |= (frame[next] as u64) << filled;
                next += 1;
                filled += 8;
            }
            values.push((acc & mask) as u32);
            acc >>= width;
            filled -= width;
        }
    }

    Ok((values, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_mixed_widths() {
        let values: Vec<u32> = (0..300).map(|i| (i * 7919) % 1000).chain([u32::MAX, 0, 1]).collect();
        let mut out = Vec::new();
        pack(&values, &mut out);
        let (decoded, used) = unpack(&out, values.len()).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(used, out.len());
    }

    #[test]
    fn test_zero_width_frame_is_one_byte() {
        let mut out = Vec::new();
        pack(&[0; 100], &mut out);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_truncated_input_is_corrupt() {
        let mut out = Vec::new();
        pack(&[5, 6, 7, 8, 9], &mut out);
        out.pop();
        assert!(matches!(unpack(&out, 5), Err(StoreError::CorruptChunk(_))));
        assert!(matches!(unpack(&[], 1), Err(StoreError::CorruptChunk(_))));
    }

    #[test]
    fn test_invalid_width_is_corrupt() {
        assert!(matches!(unpack(&[40, 0, 0], 1), Err(StoreError::CorruptChunk(_))));
    }
}
