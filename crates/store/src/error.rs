use stationcloud_core::ConfigError;

/// Failure to bring up a store component.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to start store writer thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
