use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use stationcloud_core::{Point, StoreConfig};
use stationcloud_filters::voxel_downsample;
use stationcloud_registration::{RigidTransform, TransformParseError};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::notify::{MarkerSink, SceneToken};
use crate::store::{AppendOutcome, PointStore, ViewMode};

type Query = Box<dyn FnOnce(&PointStore) + Send>;

enum Command {
    Append {
        batch: Vec<Point>,
        station: Option<String>,
        ack: Option<Sender<AppendOutcome>>,
    },
    Finalize(RigidTransform),
    Switch(String),
    UpdateBudget(f32),
    Clear,
    Query(Query),
}

/// Cloneable handle to a [`PointStore`] owned by a dedicated writer thread.
///
/// Every mutation is queued onto that one thread and runs to completion
/// before the next command starts, so readers never see a half-applied
/// append or eviction. Queries such as [`StoreHandle::snapshot`] travel the
/// same queue and block until the writer answers.
///
/// The writer stops once every handle has been dropped.
#[derive(Clone)]
pub struct StoreHandle {
    tx: Sender<Command>,
    token: Arc<AtomicU64>,
    writer: ThreadId,
    voxel_size: f32,
}

impl StoreHandle {
    /// Validates `config` and starts the writer thread. `markers` receives
    /// the notifications produced by finalize and switch; it stays owned by
    /// the caller.
    pub fn spawn(config: &StoreConfig, markers: Arc<dyn MarkerSink>) -> Result<Self, StoreError> {
        config.validate()?;
        let store = PointStore::new(config);
        let voxel_size = store.voxel_size();
        let token = Arc::new(AtomicU64::new(store.scene_token().raw()));
        let (tx, rx) = crossbeam_channel::unbounded();

        let writer_token = Arc::clone(&token);
        let writer = thread::Builder::new()
            .name("stationcloud-writer".into())
            .spawn(move || run_writer(store, rx, writer_token, markers))?;

        Ok(Self {
            tx,
            token,
            writer: writer.thread().id(),
            voxel_size,
        })
    }

    /// Downsamples on the calling thread, then queues the commit.
    pub fn append_incoming(&self, points: &[Point], station: Option<&str>) {
        let batch = voxel_downsample(points, self.voxel_size);
        self.append_downsampled(batch, station.map(str::to_string));
    }

    /// Queues the commit of an already downsampled batch.
    pub fn append_downsampled(&self, batch: Vec<Point>, station: Option<String>) {
        self.send(Command::Append {
            batch,
            station,
            ack: None,
        });
    }

    /// Queues the commit and waits for it to land.
    ///
    /// On the writer thread the commit is queued without waiting and `None`
    /// is returned; the batch still lands after the current command.
    pub fn append_downsampled_sync(
        &self,
        batch: Vec<Point>,
        station: Option<String>,
    ) -> Option<AppendOutcome> {
        if self.on_writer_thread() {
            warn!("sync append issued from the writer thread, committing without ack");
            self.append_downsampled(batch, station);
            return None;
        }
        let (ack, done) = crossbeam_channel::bounded(1);
        self.send(Command::Append {
            batch,
            station,
            ack: Some(ack),
        });
        done.recv().ok()
    }

    pub fn finalize_station(&self, relative: RigidTransform) {
        self.send(Command::Finalize(relative));
    }

    /// Parses on the calling thread; a malformed blob is rejected here and
    /// never reaches the writer.
    pub fn finalize_station_from_text(&self, text: &str) -> Result<(), TransformParseError> {
        let relative: RigidTransform = text.parse().map_err(|err| {
            warn!(%err, "rejected station transform");
            err
        })?;
        self.finalize_station(relative);
        Ok(())
    }

    pub fn switch_to_station(&self, station: impl Into<String>) {
        self.send(Command::Switch(station.into()));
    }

    pub fn update_budget(&self, fps: f32) {
        self.send(Command::UpdateBudget(fps));
    }

    pub fn clear(&self) {
        self.send(Command::Clear);
    }

    /// Runs `f` against the store on the writer thread and returns its result.
    ///
    /// Returns `None` if the writer has stopped, or if called from the writer
    /// thread itself (for instance from a [`MarkerSink`]), where waiting
    /// would deadlock.
    pub fn query<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&PointStore) -> R + Send + 'static,
    {
        if self.on_writer_thread() {
            warn!("store query issued from the writer thread");
            return None;
        }
        let (reply, answer) = crossbeam_channel::bounded(1);
        self.send(Command::Query(Box::new(move |store| {
            let _ = reply.send(f(store));
        })));
        answer.recv().ok()
    }

    /// Consistent copy of the visible buffer, or `None` under the same
    /// conditions as [`StoreHandle::query`].
    pub fn snapshot(&self) -> Option<Vec<Point>> {
        self.query(PointStore::snapshot)
    }

    pub fn snapshot_stations(&self) -> Option<BTreeMap<String, Vec<Point>>> {
        self.query(PointStore::snapshot_stations)
    }

    pub fn station_transforms(&self) -> Option<BTreeMap<String, RigidTransform>> {
        self.query(|store| store.station_transforms().clone())
    }

    pub fn current_station(&self) -> Option<String> {
        self.query(|store| store.current_station().to_string())
    }

    pub fn view_mode(&self) -> Option<ViewMode> {
        self.query(PointStore::view_mode)
    }

    pub fn budget(&self) -> Option<usize> {
        self.query(PointStore::budget)
    }

    pub fn merged_len(&self) -> Option<usize> {
        self.query(PointStore::merged_len)
    }

    /// Blocks until every command queued before this call has been applied.
    pub fn flush(&self) {
        let _ = self.query(|_| ());
    }

    /// Latest scene token, read without a round trip to the writer.
    pub fn scene_token(&self) -> SceneToken {
        SceneToken::from_raw(self.token.load(Ordering::Acquire))
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("store writer has stopped, dropping command");
        }
    }

    fn on_writer_thread(&self) -> bool {
        thread::current().id() == self.writer
    }
}

fn run_writer(
    mut store: PointStore,
    rx: Receiver<Command>,
    token: Arc<AtomicU64>,
    markers: Arc<dyn MarkerSink>,
) {
    debug!("store writer started");
    for command in rx {
        match command {
            Command::Append {
                batch,
                station,
                ack,
            } => {
                let outcome = store.append_downsampled(batch, station.as_deref());
                if let Some(ack) = ack {
                    let _ = ack.send(outcome);
                }
            }
            Command::Finalize(relative) => {
                store.finalize_station(&relative).dispatch(markers.as_ref());
            }
            Command::Switch(station) => {
                store.switch_to_station(&station).dispatch(markers.as_ref());
            }
            Command::UpdateBudget(fps) => {
                store.update_budget(fps);
            }
            Command::Clear => store.clear(),
            Command::Query(query) => query(&store),
        }
        token.store(store.scene_token().raw(), Ordering::Release);
    }
    debug!("store writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MarkerUpdate, NoMarkers};
    use stationcloud_core::BudgetConfig;

    fn config(budget: usize) -> StoreConfig {
        StoreConfig {
            budget: BudgetConfig {
                initial: budget,
                lower: 10,
                upper: budget,
                step: 10,
                ..BudgetConfig::default()
            },
            ..StoreConfig::default()
        }
    }

    fn line(n: usize, offset: usize) -> Vec<Point> {
        (offset..offset + n)
            .map(|i| Point::new([i as f32 + 0.5, 0.5, 0.5], [1.0, 0.0, 0.0]))
            .collect()
    }

    #[test]
    fn commands_apply_in_order() {
        let handle = StoreHandle::spawn(&config(100), Arc::new(NoMarkers)).unwrap();
        handle.append_downsampled(line(10, 0), None);
        handle.append_downsampled(line(10, 10), None);
        assert_eq!(handle.snapshot(), Some(line(20, 0)));
    }

    #[test]
    fn sync_append_reports_outcome() {
        let handle = StoreHandle::spawn(&config(15), Arc::new(NoMarkers)).unwrap();
        handle.append_downsampled(line(10, 0), None);
        let outcome = handle.append_downsampled_sync(line(10, 10), None).unwrap();
        assert_eq!(outcome, AppendOutcome { appended: 10, evicted: 5 });
    }

    #[test]
    fn markers_and_token_follow_mutations() {
        let (tx, rx) = crossbeam_channel::unbounded::<MarkerUpdate>();
        let handle = StoreHandle::spawn(&config(100), Arc::new(tx)).unwrap();
        let start = handle.scene_token();

        handle.append_downsampled(line(3, 0), None);
        handle.finalize_station(RigidTransform::identity());
        handle.switch_to_station("1");
        handle.flush();

        assert!(matches!(rx.try_recv(), Ok(MarkerUpdate::Add(t)) if t.contains_key("0")));
        assert_eq!(rx.try_recv(), Ok(MarkerUpdate::Remove));
        assert_ne!(handle.scene_token(), start);
        assert_eq!(handle.current_station().as_deref(), Some("1"));
        assert_eq!(handle.view_mode(), Some(ViewMode::StationLocal));
    }

    #[test]
    fn malformed_text_never_reaches_writer() {
        let (tx, rx) = crossbeam_channel::unbounded::<MarkerUpdate>();
        let handle = StoreHandle::spawn(&config(100), Arc::new(tx)).unwrap();
        assert!(handle.finalize_station_from_text("1 2 3").is_err());
        handle.flush();
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.merged_len(), Some(0));
    }

    #[test]
    fn query_from_marker_sink_does_not_deadlock() {
        struct Reentrant(std::sync::Mutex<Option<StoreHandle>>, Sender<bool>);

        impl MarkerSink for Reentrant {
            fn add_markers(&self, _: &BTreeMap<String, RigidTransform>) {}

            fn remove_markers(&self) {
                if let Some(handle) = self.0.lock().unwrap().take() {
                    let _ = self.1.send(handle.budget().is_none());
                }
            }
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let sink = Arc::new(Reentrant(std::sync::Mutex::new(None), tx));
        let handle = StoreHandle::spawn(&config(100), sink.clone()).unwrap();
        *sink.0.lock().unwrap() = Some(handle.clone());

        handle.switch_to_station("A");
        assert_eq!(rx.recv(), Ok(true));
    }

    #[test]
    fn marker_sink_snapshot_is_refused_not_empty() {
        struct Snooping(std::sync::Mutex<Option<StoreHandle>>, Sender<Option<usize>>);

        impl MarkerSink for Snooping {
            fn add_markers(&self, _: &BTreeMap<String, RigidTransform>) {
                if let Some(handle) = self.0.lock().unwrap().take() {
                    let visible = handle.snapshot().map(|points| points.len());
                    assert!(handle.append_downsampled_sync(line(1, 100), None).is_none());
                    let _ = self.1.send(visible);
                }
            }

            fn remove_markers(&self) {}
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let sink = Arc::new(Snooping(std::sync::Mutex::new(None), tx));
        let handle = StoreHandle::spawn(&config(100), sink.clone()).unwrap();
        *sink.0.lock().unwrap() = Some(handle.clone());

        handle.append_downsampled(line(5, 0), None);
        handle.finalize_station(RigidTransform::identity());

        // The sink cannot read the store from the writer thread, and says so.
        assert_eq!(rx.recv(), Ok(None));
        // The batch it committed from there is not lost.
        let stations = handle.snapshot_stations().unwrap();
        assert_eq!(stations["0"].len(), 6);
        assert_eq!(handle.merged_len(), Some(5));
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let mut cfg = config(100);
        cfg.voxel_size = 0.0;
        assert!(matches!(
            StoreHandle::spawn(&cfg, Arc::new(NoMarkers)),
            Err(StoreError::Config(_))
        ));
    }
}
