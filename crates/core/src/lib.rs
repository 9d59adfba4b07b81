#![forbid(unsafe_code)]

pub mod color;
pub mod config;
pub mod error;
pub mod grid;
pub mod point;

pub use color::{colorize_by_height, heat_map_color};
pub use config::{BudgetConfig, DensityConfig, IngestConfig, IngestMode, StoreConfig};
pub use error::ConfigError;
pub use grid::GridKey;
pub use point::Point;
