#![forbid(unsafe_code)]

pub mod accumulator;
pub mod transform;

pub use accumulator::{TransformAccumulator, ORIGIN_STATION};
pub use transform::{apply_transform, RigidTransform, TransformParseError};
