use stationcloud_core::BudgetConfig;
use tracing::debug;

/// Upper bound on the number of visible points, steered by the observed
/// frame rate.
///
/// Between `low_fps` and `high_fps` the budget holds still, so a frame rate
/// hovering near either threshold does not make it oscillate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointBudget {
    current: usize,
    config: BudgetConfig,
}

impl PointBudget {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            current: config.initial.max(config.lower).min(config.upper),
            config,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Adjusts the budget by one step for `fps`. Returns whether it changed.
    pub fn update(&mut self, fps: f32) -> bool {
        let previous = self.current;
        if fps < self.config.low_fps {
            self.current = self
                .current
                .saturating_sub(self.config.step)
                .max(self.config.lower);
        } else if fps > self.config.high_fps {
            self.current = self
                .current
                .saturating_add(self.config.step)
                .min(self.config.upper);
        }

        if self.current != previous {
            debug!(fps, from = previous, to = self.current, "point budget adjusted");
        }
        self.current != previous
    }
}
