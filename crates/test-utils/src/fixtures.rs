//! Common test fixtures for grid-store tests.
//!
//! This module provides pre-defined store shapes and parameters that
//! represent common scenarios in weather data storage.

/// Store shapes as `(dim0, dim1, chunk0, chunk1)`.
pub mod shapes {
    /// One location, 25 time steps, chunks of 10 steps
    pub const SINGLE_SERIES: (u64, u64, u64, u64) = (1, 25, 1, 10);

    /// 5x5 with 2x2 chunks, truncated chunks on both axes
    pub const SMALL_5X5: (u64, u64, u64, u64) = (5, 5, 2, 2);

    /// 100 locations, one week of hourly steps, daily chunks
    pub const HOURLY_WEEK: (u64, u64, u64, u64) = (100, 168, 10, 24);

    /// 1000 locations and 721 steps, truncated chunks on both axes
    pub const LARGE: (u64, u64, u64, u64) = (1000, 721, 6, 121);

    /// Chunk as large as the whole array
    pub const ONE_CHUNK: (u64, u64, u64, u64) = (8, 8, 8, 8);
}

/// Typical scale factors for the lossy integer codec.
pub mod scale {
    /// 2m temperature, 0.05 K resolution
    pub const TEMPERATURE: f32 = 20.0;

    /// Precipitation, 0.1 mm resolution
    pub const PRECIPITATION: f32 = 10.0;

    /// Mean sea level pressure, 0.1 hPa resolution
    pub const PRESSURE: f32 = 10.0;

    /// Integer data, stored exactly
    pub const UNIT: f32 = 1.0;
}

/// Resource names used by backend tests.
pub mod resources {
    pub const TEMPERATURE_2M: &str = "gfs/temperature_2m/chunk_1234.grds";
    pub const PRECIPITATION: &str = "icon/precipitation/chunk_1234.grds";
    pub const MISSING: &str = "gfs/does_not_exist.grds";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes_have_nonzero_chunks() {
        for (_, _, c0, c1) in [
            shapes::SINGLE_SERIES,
            shapes::SMALL_5X5,
            shapes::HOURLY_WEEK,
            shapes::LARGE,
            shapes::ONE_CHUNK,
        ] {
            assert!(c0 > 0 && c1 > 0);
        }
    }
}
