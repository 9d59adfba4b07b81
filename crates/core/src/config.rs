use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Tunables for the whole store. Every field has a default, so a config file
/// only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Edge length of the ingest voxel grid.
    pub voxel_size: f32,
    pub budget: BudgetConfig,
    pub density: DensityConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub initial: usize,
    pub lower: usize,
    pub upper: usize,
    pub step: usize,
    /// Frame rates strictly below this shrink the budget.
    pub low_fps: f32,
    /// Frame rates strictly above this grow the budget.
    pub high_fps: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    pub grid_size: f32,
    pub sub_grid_size: f32,
    pub min_points_per_object: usize,
    pub worker_threads: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub mode: IngestMode,
    /// Zero lets rayon pick the thread count.
    pub worker_threads: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Live capture: batches are downsampled in parallel and may commit out
    /// of order.
    #[default]
    Realtime,
    /// Recorded session playback: batches commit strictly in submission order.
    Replay,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.05,
            budget: BudgetConfig::default(),
            density: DensityConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            initial: 150_000,
            lower: 50_000,
            upper: 150_000,
            step: 10_000,
            low_fps: 25.0,
            high_fps: 50.0,
        }
    }
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            grid_size: 0.25,
            sub_grid_size: 0.05,
            min_points_per_object: 1000,
            worker_threads: 1,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::Realtime,
            worker_threads: 0,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_cell_size("voxel_size", self.voxel_size)?;
        self.density.validate()?;

        let b = &self.budget;
        if b.lower > b.upper {
            return Err(ConfigError::Invalid(format!(
                "budget.lower ({}) exceeds budget.upper ({})",
                b.lower, b.upper
            )));
        }
        if b.step == 0 {
            return Err(ConfigError::Invalid("budget.step must be > 0".into()));
        }
        if b.low_fps.is_nan() || b.high_fps.is_nan() || b.low_fps > b.high_fps {
            return Err(ConfigError::Invalid(format!(
                "budget.low_fps ({}) exceeds budget.high_fps ({})",
                b.low_fps, b.high_fps
            )));
        }
        Ok(())
    }
}

impl DensityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_cell_size("density.grid_size", self.grid_size)?;
        check_cell_size("density.sub_grid_size", self.sub_grid_size)
    }
}

fn check_cell_size(name: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be > 0 and finite, got {value}"
        )))
    }
}
