//! Bounded, render-ready point store for multi-station 3D capture.
//!
//! Raw batches are voxel-downsampled, committed to the active station under a
//! frame-rate driven point budget, and merged into one global cloud as each
//! station is closed with its relative transform.

#![forbid(unsafe_code)]

pub use stationcloud_core::{ConfigError, Point, StoreConfig};
pub use stationcloud_filters::{voxel_downsample, SpatialDensityIndex};
pub use stationcloud_registration::{RigidTransform, TransformParseError};
pub use stationcloud_store::{
    DensityCleaner, Ingestor, MarkerSink, MarkerUpdate, PointStore, StoreError, StoreHandle,
    ViewMode,
};
