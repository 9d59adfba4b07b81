use std::collections::BTreeMap;

use hashbrown::HashMap;
use stationcloud_core::{Point, StoreConfig};
use stationcloud_filters::voxel_downsample;
use stationcloud_registration::{
    apply_transform, RigidTransform, TransformAccumulator, TransformParseError, ORIGIN_STATION,
};
use tracing::{debug, info, warn};

use crate::budget::PointBudget;
use crate::notify::{MarkerUpdate, SceneToken};

/// Which buffer the visible set mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// The current station's own buffer.
    StationLocal,
    /// The global merged buffer.
    Merged,
}

/// Result of committing one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendOutcome {
    pub appended: usize,
    /// Points dropped from the front of the visible buffer.
    pub evicted: usize,
}

/// All point buffers plus the budget and transform state.
///
/// `PointStore` is a plain single-threaded state machine; every method runs
/// to completion before the next begins. Share it across threads through
/// [`crate::StoreHandle`], which owns one instance on a dedicated writer
/// thread.
#[derive(Debug, Clone)]
pub struct PointStore {
    voxel_size: f32,
    budget: PointBudget,
    view: ViewMode,
    current_station: String,
    visible: Vec<Point>,
    stations: HashMap<String, Vec<Point>>,
    merged: Vec<Point>,
    transforms: TransformAccumulator,
    token: SceneToken,
}

impl PointStore {
    pub fn new(config: &StoreConfig) -> Self {
        assert!(
            config.voxel_size.is_finite() && config.voxel_size > 0.0,
            "voxel_size must be > 0 and finite"
        );
        Self {
            voxel_size: config.voxel_size,
            budget: PointBudget::new(config.budget),
            view: ViewMode::StationLocal,
            current_station: ORIGIN_STATION.to_string(),
            visible: Vec::new(),
            stations: HashMap::new(),
            merged: Vec::new(),
            transforms: TransformAccumulator::new(),
            token: SceneToken::default(),
        }
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    /// Downsamples `points` and commits the result to `station` (the current
    /// station when `None`).
    pub fn append_incoming(&mut self, points: &[Point], station: Option<&str>) -> AppendOutcome {
        let batch = voxel_downsample(points, self.voxel_size);
        self.append_downsampled(batch, station)
    }

    /// Commits an already downsampled batch.
    ///
    /// The batch is cut to the budget. The overflow
    /// `visible.len() + batch.len() - budget` is then evicted from the front
    /// of both the visible buffer and the receiving station buffer, in every
    /// view mode. The batch joins the visible buffer only when it is shown
    /// (station-local view of the current station).
    pub fn append_downsampled(
        &mut self,
        mut batch: Vec<Point>,
        station: Option<&str>,
    ) -> AppendOutcome {
        self.transforms.ensure_origin();

        let budget = self.budget.current();
        if batch.len() > budget {
            debug!(len = batch.len(), budget, "batch exceeds budget, truncating");
            batch.truncate(budget);
        }

        let station = station.unwrap_or(&self.current_station).to_string();
        let shown = self.view == ViewMode::StationLocal && station == self.current_station;

        let overflow = (self.visible.len() + batch.len()).saturating_sub(budget);
        let evicted = evict_front(&mut self.visible, overflow);
        let buffer = self.station_buffer_mut(&station);
        evict_front(buffer, overflow);
        buffer.extend_from_slice(&batch);
        if shown {
            self.visible.extend_from_slice(&batch);
        }

        if evicted > 0 {
            debug!(evicted, station = %station, "evicted oldest points over budget");
        }
        debug!(
            appended = batch.len(),
            visible = self.visible.len(),
            station = %station,
            "batch committed"
        );

        AppendOutcome {
            appended: batch.len(),
            evicted,
        }
    }

    /// Closes the current station.
    ///
    /// Folds `inverse(relative)` into the accumulated transform, rewrites the
    /// station's points into the global frame (replacing its stored buffer),
    /// appends them to the merged buffer and switches to the merged view.
    pub fn finalize_station(&mut self, relative: &RigidTransform) -> MarkerUpdate {
        let station = self.current_station.clone();
        let accumulated = self.transforms.finalize(&station, relative);

        let local = self.stations.remove(&station).unwrap_or_default();
        let transformed = apply_transform(&local, &accumulated);
        self.merged.extend_from_slice(&transformed);
        let station_len = transformed.len();
        self.stations.insert(station.clone(), transformed);

        self.view = ViewMode::Merged;
        self.visible = tail(&self.merged, self.budget.current());
        self.token.bump();

        let t = accumulated.translation_part();
        info!(
            station = %station,
            points = station_len,
            merged = self.merged.len(),
            tx = t[0],
            ty = t[1],
            tz = t[2],
            "station finalized"
        );

        MarkerUpdate::Add(self.transforms.station_transforms().clone())
    }

    /// Parses `text` as a row-major 4×4 matrix and finalizes with it.
    ///
    /// On a parse failure nothing changes.
    pub fn finalize_station_from_text(
        &mut self,
        text: &str,
    ) -> Result<MarkerUpdate, TransformParseError> {
        let relative: RigidTransform = text.parse().map_err(|err| {
            warn!(%err, "rejected station transform");
            err
        })?;
        Ok(self.finalize_station(&relative))
    }

    /// Makes `station` current and shows its buffer.
    pub fn switch_to_station(&mut self, station: &str) -> MarkerUpdate {
        self.current_station = station.to_string();
        self.view = ViewMode::StationLocal;
        self.visible = self
            .stations
            .get(station)
            .map(|points| tail(points, self.budget.current()))
            .unwrap_or_default();
        self.token.bump();

        info!(station, visible = self.visible.len(), "switched station");
        MarkerUpdate::Remove
    }

    /// Steers the budget from the observed frame rate. A shrunk budget trims
    /// the oldest visible points. Returns whether the budget changed.
    pub fn update_budget(&mut self, fps: f32) -> bool {
        if !self.budget.update(fps) {
            return false;
        }
        let overflow = self.visible.len().saturating_sub(self.budget.current());
        evict_front(&mut self.visible, overflow);
        true
    }

    /// Drops every point and transform. The budget, the current station and
    /// the view mode are kept.
    pub fn clear(&mut self) {
        self.visible.clear();
        self.merged.clear();
        self.stations.clear();
        self.transforms.reset();
        self.token.bump();
        info!("store cleared");
    }

    /// Owned copy of the visible buffer.
    pub fn snapshot(&self) -> Vec<Point> {
        self.visible.clone()
    }

    pub fn visible(&self) -> &[Point] {
        &self.visible
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn merged(&self) -> &[Point] {
        &self.merged
    }

    pub fn merged_len(&self) -> usize {
        self.merged.len()
    }

    pub fn station_points(&self, station: &str) -> Option<&[Point]> {
        self.stations.get(station).map(Vec::as_slice)
    }

    /// Owned copies of every station buffer.
    pub fn snapshot_stations(&self) -> BTreeMap<String, Vec<Point>> {
        self.stations
            .iter()
            .map(|(id, points)| (id.clone(), points.clone()))
            .collect()
    }

    pub fn station_transforms(&self) -> &BTreeMap<String, RigidTransform> {
        self.transforms.station_transforms()
    }

    pub fn accumulated_transform(&self) -> &RigidTransform {
        self.transforms.accumulated()
    }

    pub fn current_station(&self) -> &str {
        &self.current_station
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view
    }

    pub fn budget(&self) -> usize {
        self.budget.current()
    }

    pub fn scene_token(&self) -> SceneToken {
        self.token
    }

    fn station_buffer_mut(&mut self, station: &str) -> &mut Vec<Point> {
        self.stations.entry_ref(station).or_default()
    }
}

/// Removes up to `count` points from the front; returns how many went.
fn evict_front(buffer: &mut Vec<Point>, count: usize) -> usize {
    let count = count.min(buffer.len());
    buffer.drain(..count);
    count
}

/// The most recent `limit` points.
fn tail(points: &[Point], limit: usize) -> Vec<Point> {
    points[points.len().saturating_sub(limit)..].to_vec()
}
