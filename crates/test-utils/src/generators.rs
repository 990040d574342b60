//! Test data generators for creating synthetic weather-like series.
//!
//! All generators return `dim0 * dim1` values in row-major order: the whole
//! time series (dim1) of location 0, then location 1, and so on.

/// Creates a grid whose values are their own flat index.
///
/// Each cell value is calculated as: `location * dim1 + step`
///
/// # Example
///
/// ```
/// use test_utils::create_index_grid;
///
/// let grid = create_index_grid(5, 5);
/// assert_eq!(grid.len(), 25);
/// assert_eq!(grid[0], 0.0);
/// assert_eq!(grid[7], 7.0); // location 1, step 2
/// ```
pub fn create_index_grid(dim0: usize, dim1: usize) -> Vec<f32> {
    (0..dim0 * dim1).map(|i| i as f32).collect()
}

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `step * 1000 + location`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[location][step] == step * 1000 + location.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(5, 10);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[0], 0.0);    // location 0, step 0
/// assert_eq!(grid[1], 1000.0); // location 0, step 1
/// assert_eq!(grid[10], 1.0);   // location 1, step 0
/// ```
pub fn create_test_grid(dim0: usize, dim1: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(dim0 * dim1);
    for location in 0..dim0 {
        for step in 0..dim1 {
            data.push((step * 1000 + location) as f32);
        }
    }
    data
}

/// Creates hourly 2m temperature series in Kelvin.
///
/// Locations get a base temperature between 250K and 280K, overlaid with a
/// diurnal cycle of ±8K over 24 steps.
pub fn create_temperature_series(dim0: usize, dim1: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(dim0 * dim1);
    for location in 0..dim0 {
        let base = 250.0 + 30.0 * location as f32 / dim0.max(1) as f32;
        for step in 0..dim1 {
            let phase = (step % 24) as f32 / 24.0 * std::f32::consts::TAU;
            data.push(base + 8.0 * phase.sin());
        }
    }
    data
}

/// Creates precipitation series in mm with many dry steps.
///
/// Uses a simple LCG so the same seed always gives the same data.
pub fn create_precipitation_series(dim0: usize, dim1: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let mut data = Vec::with_capacity(dim0 * dim1);
    for _ in 0..dim0 * dim1 {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let r = (state >> 16) as f32 / 65_536.0;
        // ~70% dry, otherwise up to 25 mm
        let value = if r < 0.7 { 0.0 } else { (r - 0.7) / 0.3 * 25.0 };
        data.push(value);
    }
    data
}

/// Creates a grid with a constant value.
pub fn create_constant_grid(dim0: usize, dim1: usize, value: f32) -> Vec<f32> {
    vec![value; dim0 * dim1]
}

/// Creates an index grid with NaN values at specified positions.
///
/// Useful for testing missing data handling.
///
/// # Arguments
///
/// * `dim0` - Number of locations
/// * `dim1` - Number of time steps
/// * `nan_positions` - List of (location, step) positions that should be NaN
pub fn create_grid_with_nans(
    dim0: usize,
    dim1: usize,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = create_index_grid(dim0, dim1);
    for &(location, step) in nan_positions {
        if location < dim0 && step < dim1 {
            data[location * dim1 + step] = f32::NAN;
        }
    }
    data
}
