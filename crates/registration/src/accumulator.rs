use std::collections::BTreeMap;

use tracing::debug;

use crate::transform::RigidTransform;

/// Station whose frame is the global frame.
pub const ORIGIN_STATION: &str = "0";

/// Running composition of per-station relative transforms.
///
/// Each finalized station contributes `inverse(relative)` on the right of the
/// running product, in the order the stations are closed. The product only
/// ever grows; the one way back to identity is [`TransformAccumulator::reset`].
#[derive(Debug, Clone, Default)]
pub struct TransformAccumulator {
    accumulated: RigidTransform,
    stations: BTreeMap<String, RigidTransform>,
}

impl TransformAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulated(&self) -> &RigidTransform {
        &self.accumulated
    }

    /// Seeds the origin station with the identity if it has no transform yet.
    /// Returns whether a seed was inserted.
    pub fn ensure_origin(&mut self) -> bool {
        if self.stations.contains_key(ORIGIN_STATION) {
            return false;
        }
        self.stations
            .insert(ORIGIN_STATION.to_string(), RigidTransform::identity());
        debug!("seeded identity transform for origin station");
        true
    }

    /// `accumulated := accumulated · inverse(relative)`
    pub fn accumulate(&mut self, relative: &RigidTransform) -> RigidTransform {
        self.accumulated = self.accumulated.compose(&relative.inverse());
        self.accumulated
    }

    /// Closes `station_id`: folds `relative` into the running transform and
    /// records the result for that station.
    pub fn finalize(&mut self, station_id: &str, relative: &RigidTransform) -> RigidTransform {
        self.ensure_origin();
        let accumulated = self.accumulate(relative);
        self.stations.insert(station_id.to_string(), accumulated);
        accumulated
    }

    pub fn station_transform(&self, station_id: &str) -> Option<&RigidTransform> {
        self.stations.get(station_id)
    }

    pub fn station_transforms(&self) -> &BTreeMap<String, RigidTransform> {
        &self.stations
    }

    /// Forgets every recorded transform and returns to identity.
    pub fn reset(&mut self) {
        self.accumulated = RigidTransform::identity();
        self.stations.clear();
    }
}
