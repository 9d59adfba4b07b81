#![forbid(unsafe_code)]

pub mod density;
pub mod voxel_downsample;

pub use density::{keep_count, uniform_sample, SpatialDensityIndex};
pub use voxel_downsample::voxel_downsample;
