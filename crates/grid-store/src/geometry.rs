//! Chunk geometry: which chunks a rectangular request touches.
//!
//! Resolution is pure arithmetic. Chunks are visited dim0-outer, dim1-inner,
//! which is also the order they are laid out in the file.

use std::ops::Range;

use crate::types::Dimensions;

/// The part of one chunk that a request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSlice {
    /// Row-major chunk index (directory position).
    pub index: u64,
    /// Chunk coordinates (dim0 chunk, dim1 chunk).
    pub coords: (u64, u64),
    /// Actual shape of the chunk (may be truncated at the array edge).
    pub shape: (u64, u64),
    /// Element range inside the chunk along dim0.
    pub local0: Range<u64>,
    /// Element range inside the chunk along dim1.
    pub local1: Range<u64>,
    /// Where the first copied element lands in the output (dim0, dim1).
    pub dest: (u64, u64),
}

impl ChunkSlice {
    /// Number of elements in the decompressed chunk.
    pub fn element_count(&self) -> usize {
        (self.shape.0 * self.shape.1) as usize
    }
}

/// Number of elements in chunk `index` along an axis of `count` elements.
pub fn chunk_extent(count: u64, chunk: u64, index: u64) -> u64 {
    let start = index * chunk;
    if start >= count {
        return 0;
    }
    chunk.min(count - start)
}

/// Actual shape of the chunk at `coords`.
pub fn chunk_shape(dims: &Dimensions, coords: (u64, u64)) -> (u64, u64) {
    (
        chunk_extent(dims.dim0, dims.chunk0, coords.0),
        chunk_extent(dims.dim1, dims.chunk1, coords.1),
    )
}

/// Clip a requested range to `[0, count)`. Returns `None` when nothing remains.
fn clip(range: &Range<u64>, count: u64) -> Option<Range<u64>> {
    let start = range.start.min(count);
    let end = range.end.min(count);
    (start < end).then_some(start..end)
}

/// Resolve the chunks intersecting `dim0 × dim1`, in row-major chunk order.
///
/// Output positions are relative to the unclipped request, so a request that
/// hangs over the array edge keeps its shape and the missing cells stay NaN.
pub fn chunks_for_range(dims: &Dimensions, dim0: &Range<u64>, dim1: &Range<u64>) -> Vec<ChunkSlice> {
    let (Some(c0), Some(c1)) = (clip(dim0, dims.dim0), clip(dim1, dims.dim1)) else {
        return Vec::new();
    };
    let (_, chunks1) = dims.num_chunks();

    let first0 = c0.start / dims.chunk0;
    let last0 = (c0.end - 1) / dims.chunk0;
    let first1 = c1.start / dims.chunk1;
    let last1 = (c1.end - 1) / dims.chunk1;

    let mut slices = Vec::with_capacity(((last0 - first0 + 1) * (last1 - first1 + 1)) as usize);
    for k0 in first0..=last0 {
        let start0 = k0 * dims.chunk0;
        let lo0 = c0.start.max(start0);
        let hi0 = c0.end.min(start0 + dims.chunk0);
        for k1 in first1..=last1 {
            let start1 = k1 * dims.chunk1;
            let lo1 = c1.start.max(start1);
            let hi1 = c1.end.min(start1 + dims.chunk1);
            slices.push(ChunkSlice {
                index: k0 * chunks1 + k1,
                coords: (k0, k1),
                shape: chunk_shape(dims, (k0, k1)),
                local0: lo0 - start0..hi0 - start0,
                local1: lo1 - start1..hi1 - start1,
                dest: (lo0 - dim0.start, lo1 - dim1.start),
            });
        }
    }
    slices
}

/// Shape of the output buffer for a request (empty for inverted ranges).
pub fn output_shape(dim0: &Range<u64>, dim1: &Range<u64>) -> (u64, u64) {
    (
        dim0.end.saturating_sub(dim0.start),
        dim1.end.saturating_sub(dim1.start),
    )
}

/// Copy the needed part of a decompressed chunk into the output buffer.
///
/// `out_dim1` is the row length of the output rectangle.
pub fn copy_chunk(slice: &ChunkSlice, chunk: &[f32], output: &mut [f32], out_dim1: u64) {
    let chunk_w = slice.shape.1;
    let width = (slice.local1.end - slice.local1.start) as usize;
    for (row, local_row) in slice.local0.clone().enumerate() {
        let src = (local_row * chunk_w + slice.local1.start) as usize;
        let dst = ((slice.dest.0 + row as u64) * out_dim1 + slice.dest.1) as usize;
        output[dst..dst + width].copy_from_slice(&chunk[src..src + width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(d0: u64, d1: u64, c0: u64, c1: u64) -> Dimensions {
        Dimensions::new(d0, d1, c0, c1).unwrap()
    }

    #[test]
    fn test_chunk_extents_sum_to_count() {
        for (count, chunk) in [(25u64, 10u64), (20, 10), (1, 7), (7, 1), (100, 33)] {
            let n = count.div_ceil(chunk);
            let total: u64 = (0..n).map(|i| chunk_extent(count, chunk, i)).sum();
            assert_eq!(total, count);
            assert_eq!(chunk_extent(count, chunk, n - 1), count - chunk * (n - 1));
        }
    }

    #[test]
    fn test_full_request_visits_all_chunks_row_major() {
        let d = dims(5, 5, 2, 2);
        let slices = chunks_for_range(&d, &(0..5), &(0..5));
        let indices: Vec<u64> = slices.iter().map(|s| s.index).collect();
        assert_eq!(indices, (0..9).collect::<Vec<_>>());
        assert_eq!(slices[8].shape, (1, 1));
        assert_eq!(slices[2].shape, (2, 1));
    }

    #[test]
    fn test_sub_range_inside_one_chunk() {
        let d = dims(1, 25, 1, 10);
        let slices = chunks_for_range(&d, &(0..1), &(12..15));
        assert_eq!(slices.len(), 1);
        let s = &slices[0];
        assert_eq!(s.index, 1);
        assert_eq!(s.local1, 2..5);
        assert_eq!(s.dest, (0, 0));
    }

    #[test]
    fn test_request_fully_outside_is_empty() {
        let d = dims(5, 5, 2, 2);
        assert!(chunks_for_range(&d, &(5..8), &(0..5)).is_empty());
        assert!(chunks_for_range(&d, &(0..5), &(10..12)).is_empty());
        assert!(chunks_for_range(&d, &(3..3), &(0..5)).is_empty());
    }

    #[test]
    fn test_partial_request_is_clipped() {
        let d = dims(5, 5, 2, 2);
        let slices = chunks_for_range(&d, &(4..7), &(3..6));
        assert_eq!(slices.len(), 2);
        let s = &slices[0];
        assert_eq!(s.coords, (2, 1));
        assert_eq!(s.local0, 0..1);
        assert_eq!(s.local1, 1..2);
        assert_eq!(s.dest, (0, 0));
        let s = &slices[1];
        assert_eq!(s.coords, (2, 2));
        assert_eq!(s.local1, 0..1);
        assert_eq!(s.dest, (0, 1));
        assert_eq!(output_shape(&(4..7), &(3..6)), (3, 3));
    }

    #[test]
    fn test_copy_chunk_places_values() {
        let d = dims(4, 4, 2, 2);
        // chunk (1,1) holds rows 2..4, cols 2..4
        let chunk = vec![22.0, 23.0, 32.0, 33.0];
        let slices = chunks_for_range(&d, &(1..4), &(1..4));
        let s = slices.iter().find(|s| s.coords == (1, 1)).unwrap();
        let mut out = vec![f32::NAN; 9];
        copy_chunk(s, &chunk, &mut out, 3);
        assert_eq!(out[4], 22.0);
        assert_eq!(out[5], 23.0);
        assert_eq!(out[7], 32.0);
        assert_eq!(out[8], 33.0);
        assert!(out[0].is_nan());
    }
}
