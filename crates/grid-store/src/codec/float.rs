//! Lossless float codec.
//!
//! Each value's bit pattern is XORed with its predecessor, the XOR words are
//! split into four byte planes (all low bytes first, high bytes last) and the
//! planes are deflated. Every bit, NaN payloads included, survives.

use std::io::{Read, Write};

use flate2::bufread::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Result, StoreError};

const PLANES: usize = 4;

/// Compress one chunk.
pub fn compress(values: &[f32]) -> Result<Vec<u8>> {
    let n = values.len();
    let mut planes = vec![0u8; n * PLANES];
    let mut previous = 0u32;
    for (i, &value) in values.iter().enumerate() {
        let bits = value.to_bits();
        let xor = bits ^ previous;
        previous = bits;
        for (plane, byte) in xor.to_le_bytes().into_iter().enumerate() {
            planes[plane * n + i] = byte;
        }
    }

    let mut encoder = DeflateEncoder::new(Vec::with_capacity(n), Compression::fast());
    encoder.write_all(&planes)?;
    Ok(encoder.finish()?)
}

/// Decompress one chunk of `count` values.
pub fn decompress(bytes: &[u8], count: usize) -> Result<Vec<f32>> {
    let expected = count * PLANES;
    let mut decoder = DeflateDecoder::new(bytes);
    let mut planes = Vec::with_capacity(expected);
    decoder
        .by_ref()
        .take(expected as u64 + 1)
        .read_to_end(&mut planes)
        .map_err(|e| StoreError::corrupt(format!("deflate: {}", e)))?;

    if planes.len() != expected {
        return Err(StoreError::corrupt(format!(
            "expected {} plane bytes, decoded {}",
            expected,
            planes.len()
        )));
    }
    if decoder.total_in() != bytes.len() as u64 {
        return Err(StoreError::corrupt(format!(
            "{} trailing bytes after deflate stream",
            bytes.len() as u64 - decoder.total_in()
        )));
    }

    let mut values = Vec::with_capacity(count);
    let mut previous = 0u32;
    for i in 0..count {
        let xor = u32::from_le_bytes([
            planes[i],
            planes[count + i],
            planes[2 * count + i],
            planes[3 * count + i],
        ]);
        previous ^= xor;
        values.push(f32::from_bits(previous));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_exact_roundtrip() {
        let values = vec![
            0.0,
            -0.0,
            1.5,
            f32::MIN_POSITIVE,
            f32::MAX,
            f32::INFINITY,
            f32::from_bits(0x7fc0_1234),
            f32::NAN,
            -273.15,
            1e-40,
        ];
        let bytes = compress(&values).unwrap();
        let decoded = decompress(&bytes, values.len()).unwrap();
        let want: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        let got: Vec<u32> = decoded.iter().map(|v| v.to_bits()).collect();
        assert_eq!(want, got);
    }

    #[test]
    fn test_repetitive_data_compresses() {
        let values = vec![101325.0f32; 2048];
        let bytes = compress(&values).unwrap();
        assert!(bytes.len() < 200);
        assert_eq!(decompress(&bytes, values.len()).unwrap(), values);
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let values: Vec<f32> = (0..256).map(|i| i as f32 * 1.25).collect();
        let bytes = compress(&values).unwrap();
        let cut = &bytes[..bytes.len() / 2];
        assert!(matches!(decompress(cut, values.len()), Err(StoreError::CorruptChunk(_))));
    }

    #[test]
    fn test_wrong_count_is_corrupt() {
        let bytes = compress(&[1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(decompress(&bytes, 4), Err(StoreError::CorruptChunk(_))));
        assert!(matches!(decompress(&bytes, 2), Err(StoreError::CorruptChunk(_))));
    }
}
