//! Chunking, compressing store writer.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::MemoryBackend;
use crate::codec;
use crate::error::{Result, StoreError};
use crate::format::{encode_directory, valid_scale, Header, ENTRY_SIZE, HEADER_SIZE};
use crate::geometry::chunk_extent;
use crate::types::{ChunkEntry, CompressionKind, Dimensions};

/// Result of finalizing a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub dims: Dimensions,
    pub compression: CompressionKind,
    pub chunk_count: u64,
    /// Size of the whole store (header, directory and payloads).
    pub total_bytes: u64,
    /// Size of the compressed chunk payloads alone.
    pub payload_bytes: u64,
}

impl WriteSummary {
    /// Serialize to JSON for ingestion logs and catalogs.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Uncompressed size over payload size.
    pub fn compression_ratio(&self) -> f64 {
        if self.payload_bytes == 0 {
            return 0.0;
        }
        (self.dims.len() * 4) as f64 / self.payload_bytes as f64
    }
}

/// Writer for a single store.
///
/// Data arrives either as one buffer ([`write_all`](Self::write_all)) or one
/// chunk row at a time, a chunk row being `chunk0` consecutive dim0 rows
/// (fewer for the last one) across all of dim1. Each row is split into chunks
/// along dim1 and compressed immediately.
///
/// A wrong element count poisons the writer: every later call, including
/// [`finish`](Self::finish), returns the same error, so a partially written
/// store can never be emitted.
#[derive(Debug)]
pub struct StoreWriter {
    dims: Dimensions,
    compression: CompressionKind,
    scale_factor: f32,
    payloads: Vec<Vec<u8>>,
    rows_written: u64,
    failed: Option<StoreError>,
}

impl StoreWriter {
    /// Create a writer. The lossy codec needs a finite, positive scale factor.
    pub fn new(dims: Dimensions, compression: CompressionKind, scale_factor: f32) -> Result<Self> {
        if compression == CompressionKind::LossyInteger && !valid_scale(scale_factor) {
            return Err(StoreError::Config(format!(
                "scale factor must be finite and > 0, got {}",
                scale_factor
            )));
        }
        Ok(Self {
            dims,
            compression,
            scale_factor,
            payloads: Vec::with_capacity(dims.chunk_count() as usize),
            rows_written: 0,
            failed: None,
        })
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dims
    }

    /// Number of chunk rows the store needs.
    pub fn chunk_rows(&self) -> u64 {
        self.dims.num_chunks().0
    }

    /// Number of chunk rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// dim0 range covered by chunk row `row`.
    pub fn row_range(&self, row: u64) -> Range<u64> {
        let start = row * self.dims.chunk0;
        start..start + chunk_extent(self.dims.dim0, self.dims.chunk0, row)
    }

    /// Number of elements chunk row `row` must hold.
    pub fn row_len(&self, row: u64) -> usize {
        let rows = self.row_range(row);
        ((rows.end - rows.start) * self.dims.dim1) as usize
    }

    fn check(&self) -> Result<()> {
        match &self.failed {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn poison(&mut self, err: StoreError) -> StoreError {
        warn!(error = %err, rows_written = self.rows_written, "Writer failed");
        self.failed = Some(err.clone());
        err
    }

    /// Write the whole array in one call (`dim0 * dim1` elements, row-major).
    pub fn write_all(&mut self, values: &[f32]) -> Result<()> {
        self.check()?;
        let expected = self.dims.len() as usize;
        if self.rows_written != 0 || values.len() != expected {
            return Err(self.poison(StoreError::ShapeMismatch {
                chunk_row: self.rows_written,
                expected,
                actual: values.len(),
            }));
        }
        let row_stride = (self.dims.chunk0 * self.dims.dim1) as usize;
        for row in 0..self.chunk_rows() {
            let start = row as usize * row_stride;
            let end = start + self.row_len(row);
            self.write_chunk_row(&values[start..end])?;
        }
        Ok(())
    }

    /// Write the next chunk row.
    pub fn write_chunk_row(&mut self, values: &[f32]) -> Result<()> {
        self.check()?;
        let row = self.rows_written;
        let expected = if row < self.chunk_rows() { self.row_len(row) } else { 0 };
        if row >= self.chunk_rows() || values.len() != expected {
            return Err(self.poison(StoreError::ShapeMismatch {
                chunk_row: row,
                expected,
                actual: values.len(),
            }));
        }

        let rows = (self.row_range(row).end - self.row_range(row).start) as usize;
        let dim1 = self.dims.dim1 as usize;
        let (_, chunks1) = self.dims.num_chunks();
        let mut chunk = Vec::with_capacity(rows * self.dims.chunk1 as usize);
        for k1 in 0..chunks1 {
            let col0 = (k1 * self.dims.chunk1) as usize;
            let width = chunk_extent(self.dims.dim1, self.dims.chunk1, k1) as usize;
            chunk.clear();
            for r in 0..rows {
                let start = r * dim1 + col0;
                chunk.extend_from_slice(&values[start..start + width]);
            }
            match codec::compress(self.compression, &chunk, self.scale_factor) {
                Ok(bytes) => self.payloads.push(bytes),
                Err(e) => return Err(self.poison(e.in_chunk(row * chunks1 + k1))),
            }
        }

        self.rows_written += 1;
        Ok(())
    }

    /// Write every remaining chunk row by calling `producer` once per row.
    ///
    /// The producer gets the chunk row index and the dim0 range it covers and
    /// returns that row's values. A producer error poisons the writer.
    pub fn write_streaming<F>(&mut self, mut producer: F) -> Result<()>
    where
        F: FnMut(u64, Range<u64>) -> Result<Vec<f32>>,
    {
        self.check()?;
        while self.rows_written < self.chunk_rows() {
            let row = self.rows_written;
            let values = match producer(row, self.row_range(row)) {
                Ok(values) => values,
                Err(e) => return Err(self.poison(e)),
            };
            self.write_chunk_row(&values)?;
        }
        Ok(())
    }

    /// Serialize header, directory and payloads.
    ///
    /// Fails with `Incomplete` unless every chunk row was written.
    pub fn finish(self) -> Result<FinishedStore> {
        self.check()?;
        if self.rows_written != self.chunk_rows() {
            return Err(StoreError::Incomplete {
                written: self.rows_written,
                expected: self.chunk_rows(),
            });
        }

        let header = Header {
            dims: self.dims,
            compression: self.compression,
            scale_factor: self.scale_factor,
        };
        let mut offset = header.payload_start();
        let entries: Vec<ChunkEntry> = self
            .payloads
            .iter()
            .map(|payload| {
                let entry = ChunkEntry {
                    offset,
                    length: payload.len() as u64,
                };
                offset += entry.length;
                entry
            })
            .collect();

        let payload_bytes = offset - header.payload_start();
        let mut buf = BytesMut::with_capacity(offset as usize);
        header.encode(&mut buf);
        encode_directory(&entries, &mut buf);
        for payload in &self.payloads {
            buf.extend_from_slice(payload);
        }
        debug_assert_eq!(
            buf.len() as u64,
            HEADER_SIZE + ENTRY_SIZE * entries.len() as u64 + payload_bytes
        );

        let summary = WriteSummary {
            dims: self.dims,
            compression: self.compression,
            chunk_count: entries.len() as u64,
            total_bytes: buf.len() as u64,
            payload_bytes,
        };
        debug!(
            dim0 = summary.dims.dim0,
            dim1 = summary.dims.dim1,
            compression = %summary.compression,
            chunks = summary.chunk_count,
            total_bytes = summary.total_bytes,
            payload_bytes = summary.payload_bytes,
            "Finalized store"
        );

        Ok(FinishedStore {
            bytes: buf.freeze(),
            summary,
        })
    }
}

/// A complete, serialized store ready to be emitted.
#[derive(Debug, Clone)]
pub struct FinishedStore {
    bytes: Bytes,
    summary: WriteSummary,
}

impl FinishedStore {
    pub fn summary(&self) -> &WriteSummary {
        &self.summary
    }

    /// The serialized store.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Wrap the serialized store in a memory backend.
    pub fn into_backend(self) -> MemoryBackend {
        MemoryBackend::new(self.bytes)
    }

    /// Write to `path`, atomically replacing any existing file.
    ///
    /// The store is written to a temporary file in the same directory and
    /// renamed over `path`, so readers see either the old file or the
    /// complete new one.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<WriteSummary> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::from(e.error))?;
        debug!(path = %path.display(), bytes = self.bytes.len(), "Wrote store");
        Ok(self.summary.clone())
    }

    /// Write to an anonymous temporary file, rewound to the start.
    ///
    /// The file is unlinked at creation and disappears when the handle is
    /// dropped.
    pub fn write_to_anonymous(&self) -> Result<File> {
        let mut file = tempfile::tempfile()?;
        file.write_all(&self.bytes)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::decode_directory;
    use std::io::Read;
    use tokio_test::{assert_err, assert_ok};

    fn dims(d0: u64, d1: u64, c0: u64, c1: u64) -> Dimensions {
        Dimensions::new(d0, d1, c0, c1).unwrap()
    }

    #[test]
    fn test_write_all_layout() {
        let mut writer = StoreWriter::new(dims(5, 5, 2, 2), CompressionKind::LosslessFloat, 1.0).unwrap();
        let values: Vec<f32> = (0..25).map(|v| v as f32).collect();
        writer.write_all(&values).unwrap();
        let store = writer.finish().unwrap();
        assert_eq!(store.summary().chunk_count, 9);
        assert_eq!(store.summary().to_json()["compression"], "LosslessFloat");

        let bytes = store.into_bytes();
        let header = Header::decode(&bytes).unwrap();
        assert_eq!(header.dims, dims(5, 5, 2, 2));
        let directory = bytes.slice(HEADER_SIZE as usize..header.payload_start() as usize);
        let entries = decode_directory(&header, directory, bytes.len() as u64).unwrap();
        assert_eq!(entries.len(), 9);
        assert_eq!(entries[0].offset, header.payload_start());
        assert_eq!(entries[8].end(), bytes.len() as u64);
    }

    #[test]
    fn test_streaming_rows() {
        let mut writer = StoreWriter::new(dims(5, 5, 2, 2), CompressionKind::LossyInteger, 1.0).unwrap();
        assert_eq!(writer.chunk_rows(), 3);
        assert_eq!(writer.row_len(0), 10);
        assert_eq!(writer.row_len(2), 5);
        assert_eq!(writer.row_range(2), 4..5);

        writer.write_chunk_row(&[0.0; 10]).unwrap();
        writer.write_chunk_row(&[0.0; 10]).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(StoreError::Incomplete { written: 2, expected: 3 })
        ));
    }

    #[test]
    fn test_shape_mismatch_poisons() {
        let mut writer = StoreWriter::new(dims(1, 10, 1, 10), CompressionKind::LossyInteger, 1.0).unwrap();
        let err = writer.write_chunk_row(&[1.0; 9]).unwrap_err();
        assert_eq!(
            err,
            StoreError::ShapeMismatch {
                chunk_row: 0,
                expected: 10,
                actual: 9
            }
        );
        // The writer stays poisoned even when given correct data
        assert_eq!(writer.write_chunk_row(&[1.0; 10]).unwrap_err(), err);
        assert_eq!(writer.finish().unwrap_err(), err);
    }

    #[test]
    fn test_extra_row_rejected() {
        let mut writer = StoreWriter::new(dims(1, 2, 1, 2), CompressionKind::LosslessFloat, 1.0).unwrap();
        writer.write_chunk_row(&[1.0, 2.0]).unwrap();
        assert!(matches!(
            writer.write_chunk_row(&[1.0, 2.0]),
            Err(StoreError::ShapeMismatch { chunk_row: 1, expected: 0, actual: 2 })
        ));
    }

    #[test]
    fn test_write_streaming_producer() {
        let mut writer = StoreWriter::new(dims(5, 3, 2, 3), CompressionKind::LosslessFloat, 1.0).unwrap();
        let mut calls = Vec::new();
        writer
            .write_streaming(|row, range| {
                calls.push(row);
                Ok(range
                    .flat_map(|x| (0..3).map(move |y| (x * 3 + y) as f32))
                    .collect())
            })
            .unwrap();
        assert_eq!(calls, vec![0, 1, 2]);
        assert_ok!(writer.finish());
    }

    #[test]
    fn test_producer_error_poisons() {
        let mut writer = StoreWriter::new(dims(4, 1, 2, 1), CompressionKind::LosslessFloat, 1.0).unwrap();
        let result = writer.write_streaming(|row, _| {
            if row == 1 {
                Err(StoreError::Io("decode failed".to_string()))
            } else {
                Ok(vec![0.0; 2])
            }
        });
        assert_err!(result);
        assert_err!(writer.finish());
    }

    #[test]
    fn test_invalid_scale() {
        assert_err!(StoreWriter::new(dims(1, 1, 1, 1), CompressionKind::LossyInteger, 0.0));
        assert_err!(StoreWriter::new(dims(1, 1, 1, 1), CompressionKind::LossyInteger, f32::NAN));
        assert_ok!(StoreWriter::new(dims(1, 1, 1, 1), CompressionKind::LosslessFloat, 0.0));
    }

    #[test]
    fn test_write_to_path_replaces() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("temperature_2m.grds");
        std::fs::write(&path, b"old contents").unwrap();

        let mut writer = StoreWriter::new(dims(2, 2, 1, 1), CompressionKind::LosslessFloat, 1.0).unwrap();
        writer.write_all(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let store = writer.finish().unwrap();
        let summary = store.write_to_path(&path).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len() as u64, summary.total_bytes);
        assert_eq!(&written[..4], b"GRDS");
        // Only the target remains in the directory
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_to_anonymous() {
        let mut writer = StoreWriter::new(dims(1, 3, 1, 3), CompressionKind::LosslessFloat, 1.0).unwrap();
        writer.write_all(&[1.0, 2.0, 3.0]).unwrap();
        let store = writer.finish().unwrap();
        let mut file = store.write_to_anonymous().unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, store.into_bytes().to_vec());
    }
}
