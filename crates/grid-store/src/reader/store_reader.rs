//! Random-access reader over a finished store.

use std::ops::Range;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::future::try_join_all;
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, instrument};

use super::interpolate::{bilinear, clamp_pair, linear, GridPoint};
use crate::backend::Backend;
use crate::cache::{BlockCache, CachedBackend};
use crate::codec;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::format::{decode_directory, Header, HEADER_SIZE};
use crate::geometry::{chunks_for_range, copy_chunk, output_shape, ChunkSlice};
use crate::types::{ChunkEntry, CompressionKind, Dimensions};

/// A run of chunks stored back to back, fetched as one byte range.
struct Run {
    offset: u64,
    length: u64,
    slices: Vec<usize>,
}

/// Reader for one store.
///
/// The header and chunk directory are read once at open and are immutable
/// afterwards, so a reader can serve any number of concurrent reads.
pub struct StoreReader<B> {
    backend: B,
    header: Header,
    directory: Vec<ChunkEntry>,
    config: StoreConfig,
}

impl<B: Backend> StoreReader<B> {
    /// Open a store with the default configuration.
    pub async fn open(backend: B) -> Result<Self> {
        Self::open_with_config(backend, StoreConfig::default()).await
    }

    /// Open a store: read and validate the header, then the chunk directory.
    #[instrument(skip(backend, config), fields(size = backend.len()))]
    pub async fn open_with_config(backend: B, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let len = backend.len();
        if len < HEADER_SIZE {
            return Err(StoreError::invalid_header(format!(
                "resource is {} bytes, smaller than a store header",
                len
            )));
        }

        let head = backend.read(0, HEADER_SIZE).await?;
        let header = Header::decode(&head)?;
        if header.payload_start() > len {
            return Err(StoreError::out_of_range(format!(
                "directory ends at {} beyond resource size {}",
                header.payload_start(),
                len
            )));
        }

        let directory = match header.directory_size() {
            0 => Bytes::new(),
            size => backend.read(HEADER_SIZE, size).await?,
        };
        let directory = decode_directory(&header, directory, len)?;

        debug!(
            dim0 = header.dims.dim0,
            dim1 = header.dims.dim1,
            chunk0 = header.dims.chunk0,
            chunk1 = header.dims.chunk1,
            compression = %header.compression,
            chunks = directory.len(),
            "Opened store"
        );

        Ok(Self {
            backend,
            header,
            directory,
            config,
        })
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.header.dims
    }

    pub fn compression(&self) -> CompressionKind {
        self.header.compression
    }

    pub fn scale_factor(&self) -> f32 {
        self.header.scale_factor
    }

    /// Chunk directory in row-major chunk order.
    pub fn directory(&self) -> &[ChunkEntry] {
        &self.directory
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn decode(&self, slice: &ChunkSlice, bytes: &[u8]) -> Result<Vec<f32>> {
        codec::decompress(
            self.header.compression,
            bytes,
            slice.element_count(),
            self.header.scale_factor,
        )
        .map_err(|e| e.in_chunk(slice.index))
    }

    /// Read the rectangle `dim0 × dim1`, row-major.
    ///
    /// The output always has the requested shape; cells outside the array
    /// are NaN. Each intersecting chunk is fetched with its own request.
    #[instrument(skip(self))]
    pub async fn read(&self, dim0: Range<u64>, dim1: Range<u64>) -> Result<Vec<f32>> {
        let (rows, cols) = output_shape(&dim0, &dim1);
        let mut output = vec![f32::NAN; (rows * cols) as usize];
        let slices = chunks_for_range(&self.header.dims, &dim0, &dim1);
        debug!(chunks = slices.len(), rows, cols, "Resolved chunks");
        if slices.is_empty() {
            return Ok(output);
        }

        let fetched = try_join_all(slices.iter().map(|slice| {
            let entry = self.directory[slice.index as usize];
            self.backend.read(entry.offset, entry.length)
        }))
        .await?;

        for (slice, bytes) in slices.iter().zip(&fetched) {
            let chunk = self.decode(slice, bytes)?;
            copy_chunk(slice, &chunk, &mut output, cols);
        }
        Ok(output)
    }

    /// Read like [`read`](Self::read), batching backend requests.
    ///
    /// Chunks stored back to back are merged into one byte range, each range
    /// is split into requests of at most `io_size_max` bytes, and up to
    /// `max_concurrent_requests` requests are in flight at once. Output is
    /// identical to `read`.
    #[instrument(skip(self))]
    pub async fn read_concurrent(&self, dim0: Range<u64>, dim1: Range<u64>) -> Result<Vec<f32>> {
        let (rows, cols) = output_shape(&dim0, &dim1);
        let mut output = vec![f32::NAN; (rows * cols) as usize];
        let slices = chunks_for_range(&self.header.dims, &dim0, &dim1);
        if slices.is_empty() {
            return Ok(output);
        }

        let runs = self.coalesce(&slices);
        let io_size_max = self.config.io_size_max;
        let requests: Vec<(u64, u64)> = runs
            .iter()
            .flat_map(|run| {
                (0..run.length.div_ceil(io_size_max)).map(move |i| {
                    let start = i * io_size_max;
                    (run.offset + start, io_size_max.min(run.length - start))
                })
            })
            .collect();
        debug!(
            chunks = slices.len(),
            runs = runs.len(),
            requests = requests.len(),
            "Planned concurrent read"
        );

        let parts: Vec<Bytes> = stream::iter(requests)
            .map(|(offset, length)| self.backend.read(offset, length))
            .buffered(self.config.max_concurrent_requests)
            .try_collect()
            .await?;

        let mut parts = parts.into_iter();
        for run in &runs {
            let mut buf = BytesMut::with_capacity(run.length as usize);
            while (buf.len() as u64) < run.length {
                match parts.next() {
                    Some(part) => buf.extend_from_slice(&part),
                    None => return Err(StoreError::backend("missing response part")),
                }
            }
            for &i in &run.slices {
                let slice = &slices[i];
                let entry = self.directory[slice.index as usize];
                let start = (entry.offset - run.offset) as usize;
                let chunk = self.decode(slice, &buf[start..start + entry.length as usize])?;
                copy_chunk(slice, &chunk, &mut output, cols);
            }
        }
        Ok(output)
    }

    /// Group slices into runs of adjacent chunk payloads.
    fn coalesce(&self, slices: &[ChunkSlice]) -> Vec<Run> {
        let mut runs: Vec<Run> = Vec::new();
        for (i, slice) in slices.iter().enumerate() {
            let entry = self.directory[slice.index as usize];
            match runs.last_mut() {
                Some(run) if run.offset + run.length == entry.offset => {
                    run.length += entry.length;
                    run.slices.push(i);
                }
                _ => runs.push(Run {
                    offset: entry.offset,
                    length: entry.length,
                    slices: vec![i],
                }),
            }
        }
        runs
    }

    /// Blend dim0 rows `x` and `x + 1` over `dim1`.
    #[instrument(skip(self))]
    pub async fn read_interpolated_linear(
        &self,
        x: u64,
        x_fraction: f32,
        dim1: Range<u64>,
    ) -> Result<Vec<f32>> {
        let (x, xf) = clamp_pair(x, x_fraction, self.header.dims.dim0);
        let span = if self.header.dims.dim0 >= 2 { 2 } else { 1 };
        let (_, cols) = output_shape(&(0..1), &dim1);
        let rows = self.read(x..x + span, dim1).await?;
        let cols = cols as usize;
        let second = if span == 2 { cols } else { 0 };

        Ok((0..cols)
            .map(|i| linear(rows[i], rows[second + i], xf))
            .collect())
    }

    /// Bilinear read at a fractional point of a 2-D grid stored along dim0.
    ///
    /// dim0 holds `nx * ny` locations with index `y * nx + x`. The 2x2
    /// neighbourhood is clamped to the grid.
    #[instrument(skip(self))]
    pub async fn read_interpolated(&self, point: GridPoint, dim1: Range<u64>) -> Result<Vec<f32>> {
        if point.nx == 0 || self.header.dims.dim0 % point.nx != 0 {
            return Err(StoreError::InvalidDimensions(format!(
                "dim0 {} is not a multiple of grid width {}",
                self.header.dims.dim0, point.nx
            )));
        }
        let ny = self.header.dims.dim0 / point.nx;
        let (x, xf) = clamp_pair(point.x, point.x_fraction, point.nx);
        let (y, yf) = clamp_pair(point.y, point.y_fraction, ny);
        let x_span = point.nx.min(2);
        let y_next = if ny >= 2 { y + 1 } else { y };

        let lower_start = y * point.nx + x;
        let upper_start = y_next * point.nx + x;
        let (lower, upper) = futures::try_join!(
            self.read(lower_start..lower_start + x_span, dim1.clone()),
            self.read(upper_start..upper_start + x_span, dim1.clone()),
        )?;

        let cols = output_shape(&(0..1), &dim1).1 as usize;
        let right = if x_span == 2 { cols } else { 0 };
        Ok((0..cols)
            .map(|i| {
                bilinear(
                    lower[i],
                    lower[right + i],
                    upper[i],
                    upper[right + i],
                    xf,
                    yf,
                )
            })
            .collect())
    }
}

impl<B: Backend + 'static> StoreReader<CachedBackend<B>> {
    /// Open a store whose reads go through a shared block cache.
    pub async fn open_cached(backend: B, cache: Arc<BlockCache>, config: StoreConfig) -> Result<Self> {
        Self::open_with_config(CachedBackend::new(backend, cache), config).await
    }
}
