use std::sync::{Arc, Condvar, Mutex, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};
use stationcloud_core::{IngestMode, Point, StoreConfig};
use stationcloud_filters::voxel_downsample;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::handle::StoreHandle;

/// Front-end that downsamples incoming batches off the writer thread and
/// submits the results to a [`StoreHandle`].
///
/// In [`IngestMode::Realtime`] batches are downsampled concurrently on a
/// rayon pool and may commit in any order. In [`IngestMode::Replay`] each
/// batch is downsampled on the caller's thread and `submit` returns only
/// after the commit has landed, so recorded sessions stitch in order.
///
/// There is no cancellation: a batch still in flight when the store is
/// cleared is committed afterwards like any other append.
pub struct Ingestor {
    pool: ThreadPool,
    store: StoreHandle,
    mode: IngestMode,
    voxel_size: f32,
    in_flight: Arc<InFlight>,
}

#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Marks one batch in flight until dropped, including on unwind.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

impl InFlight {
    fn start(self: &Arc<Self>) -> InFlightGuard {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        InFlightGuard(Arc::clone(self))
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait(&self) {
        let count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let _idle = self
            .idle
            .wait_while(count, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

impl Ingestor {
    pub fn new(store: StoreHandle, config: &StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.ingest.worker_threads)
            .thread_name(|i| format!("stationcloud-ingest-{i}"))
            .panic_handler(|_| error!("ingest job panicked, batch dropped"))
            .build()?;

        Ok(Self {
            pool,
            store,
            mode: config.ingest.mode,
            voxel_size: config.voxel_size,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Ingests a batch for the current station.
    pub fn submit(&self, points: Vec<Point>) {
        self.submit_for(points, None);
    }

    /// Ingests a batch for `station`, or the current station when `None`.
    pub fn submit_for(&self, points: Vec<Point>, station: Option<String>) {
        match self.mode {
            IngestMode::Replay => {
                let batch = voxel_downsample(&points, self.voxel_size);
                debug!(raw = points.len(), batch = batch.len(), "replay batch");
                self.store.append_downsampled_sync(batch, station);
            }
            IngestMode::Realtime => {
                let store = self.store.clone();
                let voxel_size = self.voxel_size;
                let guard = self.in_flight.start();
                self.pool.spawn(move || {
                    let _guard = guard;
                    let batch = voxel_downsample(&points, voxel_size);
                    debug!(raw = points.len(), batch = batch.len(), "realtime batch");
                    store.append_downsampled(batch, station);
                });
            }
        }
    }

    /// Blocks until every submitted batch has been committed.
    pub fn wait_idle(&self) {
        self.in_flight.wait();
        self.store.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoMarkers;
    use stationcloud_core::{BudgetConfig, IngestConfig};

    fn config(mode: IngestMode) -> StoreConfig {
        StoreConfig {
            voxel_size: 0.5,
            budget: BudgetConfig {
                initial: 10_000,
                lower: 10,
                upper: 10_000,
                ..BudgetConfig::default()
            },
            ingest: IngestConfig {
                mode,
                worker_threads: 4,
            },
            ..StoreConfig::default()
        }
    }

    /// Four raw points collapsing onto one voxel centroid at `(i, 0, 0)`.
    fn cluster(i: usize) -> Vec<Point> {
        let x = i as f32 + 0.25;
        [0.0, 0.1, 0.2, 0.3]
            .into_iter()
            .map(|d| Point::new([x + d - 0.15, 0.2, 0.2], [0.0, 1.0, 0.0]))
            .collect()
    }

    #[test]
    fn replay_preserves_batch_order() {
        let cfg = config(IngestMode::Replay);
        let store = StoreHandle::spawn(&cfg, Arc::new(NoMarkers)).unwrap();
        let ingestor = Ingestor::new(store, &cfg).unwrap();

        for i in 0..50 {
            ingestor.submit(cluster(i));
        }

        let visible = ingestor.store().snapshot().unwrap();
        assert_eq!(visible.len(), 50);
        for (i, p) in visible.iter().enumerate() {
            assert!((p.position[0] - (i as f32 + 0.25)).abs() < 1e-4);
        }
    }

    #[test]
    fn realtime_commits_every_batch() {
        let cfg = config(IngestMode::Realtime);
        let store = StoreHandle::spawn(&cfg, Arc::new(NoMarkers)).unwrap();
        let ingestor = Ingestor::new(store, &cfg).unwrap();

        for i in 0..200 {
            ingestor.submit_for(cluster(i), Some("R".to_string()));
        }
        ingestor.wait_idle();

        let stations = ingestor.store().snapshot_stations().unwrap();
        assert_eq!(stations["R"].len(), 200);
        assert_eq!(ingestor.store().snapshot(), Some(Vec::new()));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = config(IngestMode::Realtime);
        let store = StoreHandle::spawn(&cfg, Arc::new(NoMarkers)).unwrap();
        let bad = StoreConfig {
            voxel_size: f32::NAN,
            ..cfg
        };
        assert!(matches!(
            Ingestor::new(store, &bad),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn panicking_job_releases_in_flight() {
        let in_flight = Arc::new(InFlight::default());
        let guard = in_flight.start();
        let job = std::thread::spawn(move || {
            let _guard = guard;
            panic!("downsample failed");
        });
        assert!(job.join().is_err());
        // Returns instead of waiting forever on the lost batch.
        in_flight.wait();
        assert_eq!(*in_flight.count.lock().unwrap(), 0);
    }
}
