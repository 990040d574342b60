//! Store reader and interpolation.

mod interpolate;
mod store_reader;

pub use interpolate::{bilinear, clamp_pair, hermite_resample, linear, GridPoint};
pub use store_reader::StoreReader;
