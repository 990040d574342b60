//! Binary container layout.
//!
//! ```text
//! 0   magic "GRDS"
//! 4   version (u8)
//! 5   compression kind (u8)
//! 6   reserved (2 bytes)
//! 8   scale factor (f32)
//! 12  reserved (4 bytes)
//! 16  dim0, dim1, chunk0, chunk1 (u64 each)
//! 48  directory: (offset u64, length u64) per chunk, row-major
//! ..  compressed chunk payloads
//! ```
//!
//! All integers are little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, StoreError};
use crate::types::{ChunkEntry, CompressionKind, Dimensions};

/// File marker.
pub const MAGIC: [u8; 4] = *b"GRDS";

/// Current format version.
pub const VERSION: u8 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: u64 = 48;

/// Size of one directory entry in bytes.
pub const ENTRY_SIZE: u64 = 16;

/// Parsed fixed-size header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub dims: Dimensions,
    pub compression: CompressionKind,
    pub scale_factor: f32,
}

impl Header {
    /// Size of the chunk directory following the header.
    pub fn directory_size(&self) -> u64 {
        self.dims.chunk_count() * ENTRY_SIZE
    }

    /// Offset of the first payload byte.
    pub fn payload_start(&self) -> u64 {
        HEADER_SIZE + self.directory_size()
    }

    /// Serialize the header.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.compression.as_u8());
        buf.put_u16_le(0);
        buf.put_f32_le(self.scale_factor);
        buf.put_u32_le(0);
        buf.put_u64_le(self.dims.dim0);
        buf.put_u64_le(self.dims.dim1);
        buf.put_u64_le(self.dims.chunk0);
        buf.put_u64_le(self.dims.chunk1);
    }

    /// Parse and validate a header.
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        if (bytes.len() as u64) < HEADER_SIZE {
            return Err(StoreError::invalid_header(format!(
                "need {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        if bytes[..4] != MAGIC {
            return Err(StoreError::invalid_header("bad magic"));
        }
        bytes.advance(4);

        let version = bytes.get_u8();
        if version != VERSION {
            return Err(StoreError::invalid_header(format!(
                "unsupported version {}",
                version
            )));
        }
        let tag = bytes.get_u8();
        let compression = CompressionKind::from_u8(tag)
            .ok_or_else(|| StoreError::invalid_header(format!("unknown compression {}", tag)))?;
        bytes.advance(2);
        let scale_factor = bytes.get_f32_le();
        bytes.advance(4);

        let dim0 = bytes.get_u64_le();
        let dim1 = bytes.get_u64_le();
        let chunk0 = bytes.get_u64_le();
        let chunk1 = bytes.get_u64_le();
        let dims = Dimensions::new(dim0, dim1, chunk0, chunk1)
            .map_err(|e| StoreError::invalid_header(e.to_string()))?;

        if compression == CompressionKind::LossyInteger && !valid_scale(scale_factor) {
            return Err(StoreError::invalid_header(format!(
                "invalid scale factor {}",
                scale_factor
            )));
        }

        Ok(Self {
            dims,
            compression,
            scale_factor,
        })
    }
}

/// A lossy-integer scale factor must be finite and positive.
pub fn valid_scale(scale_factor: f32) -> bool {
    scale_factor.is_finite() && scale_factor > 0.0
}

/// Serialize the chunk directory.
pub fn encode_directory(entries: &[ChunkEntry], buf: &mut BytesMut) {
    for entry in entries {
        buf.put_u64_le(entry.offset);
        buf.put_u64_le(entry.length);
    }
}

/// Parse the chunk directory and check that it tiles `[payload_start, resource_len)`.
pub fn decode_directory(header: &Header, mut bytes: Bytes, resource_len: u64) -> Result<Vec<ChunkEntry>> {
    let count = header.dims.chunk_count();
    if (bytes.len() as u64) < count * ENTRY_SIZE {
        return Err(StoreError::invalid_header(format!(
            "directory truncated: need {} entries",
            count
        )));
    }

    let mut entries = Vec::with_capacity(count as usize);
    let mut expected_offset = header.payload_start();
    for index in 0..count {
        let entry = ChunkEntry {
            offset: bytes.get_u64_le(),
            length: bytes.get_u64_le(),
        };
        if entry.length == 0 || entry.offset != expected_offset {
            return Err(StoreError::invalid_header(format!(
                "chunk {} entry {:?} does not follow offset {}",
                index, entry, expected_offset
            )));
        }
        if entry.end() > resource_len {
            return Err(StoreError::out_of_range(format!(
                "chunk {} ends at {} beyond resource size {}",
                index,
                entry.end(),
                resource_len
            )));
        }
        expected_offset = entry.end();
        entries.push(entry);
    }
    Ok(entries)
}
