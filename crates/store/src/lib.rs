#![forbid(unsafe_code)]

pub mod budget;
pub mod cleaner;
pub mod error;
pub mod handle;
pub mod ingest;
pub mod notify;
pub mod store;

pub use budget::PointBudget;
pub use cleaner::DensityCleaner;
pub use error::StoreError;
pub use handle::StoreHandle;
pub use ingest::Ingestor;
pub use notify::{MarkerSink, MarkerUpdate, NoMarkers, SceneToken};
pub use store::{AppendOutcome, PointStore, ViewMode};
