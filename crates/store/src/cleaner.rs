use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::Receiver;
use rayon::{ThreadPool, ThreadPoolBuilder};
use stationcloud_core::{DensityConfig, Point};
use stationcloud_filters::SpatialDensityIndex;
use tracing::{debug, error};

use crate::error::StoreError;

/// Best-effort density thinning on its own small thread pool.
///
/// Snapshots handed to it accumulate in one persistent index. Each pass
/// thins every bucket at its full size, then caps the stored buckets to their
/// newest `2 * min_points_per_object` points. It never touches the live
/// store, so it can run behind ingestion without blocking the writer. Results
/// may be based on slightly stale data.
pub struct DensityCleaner {
    pool: ThreadPool,
    index: Arc<Mutex<SpatialDensityIndex>>,
}

impl DensityCleaner {
    pub fn new(config: DensityConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .thread_name(|i| format!("stationcloud-density-{i}"))
            .panic_handler(|_| error!("density pass panicked"))
            .build()?;

        Ok(Self {
            pool,
            index: Arc::new(Mutex::new(SpatialDensityIndex::new(config))),
        })
    }

    /// Adds `snapshot` to the index and thins it. The thinned set arrives on
    /// the returned channel.
    pub fn schedule(&self, snapshot: Vec<Point>) -> Receiver<Vec<Point>> {
        self.schedule_with(snapshot, None)
    }

    /// Like [`DensityCleaner::schedule`] with a fixed thinning seed.
    pub fn schedule_seeded(&self, snapshot: Vec<Point>, seed: u64) -> Receiver<Vec<Point>> {
        self.schedule_with(snapshot, Some(seed))
    }

    /// Empties the index.
    pub fn reset(&self) {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of points currently indexed.
    pub fn indexed_len(&self) -> usize {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn schedule_with(&self, snapshot: Vec<Point>, seed: Option<u64>) -> Receiver<Vec<Point>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let shared = Arc::clone(&self.index);
        self.pool.spawn(move || {
            // The lock must not be held across the parallel thinning.
            let view = {
                let mut index = shared.lock().unwrap_or_else(PoisonError::into_inner);
                index.insert(&snapshot);
                index.clone()
            };
            let thinned = match seed {
                Some(seed) => view.thin_seeded(seed),
                None => view.thin(),
            };
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cleanup();
            debug!(
                input = snapshot.len(),
                indexed = view.len(),
                kept = thinned.len(),
                "density cleanup pass"
            );
            let _ = tx.send(thinned);
        });
        rx
    }
}
