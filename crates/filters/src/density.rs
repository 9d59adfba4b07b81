use hashbrown::{HashMap, HashSet};
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use stationcloud_core::{DensityConfig, GridKey, Point};
use tracing::debug;

/// Number of points a bucket of `count` points keeps after thinning.
///
/// Buckets at or below `min_points_per_object` are left alone. Denser buckets
/// keep `max(0.5, 1 - ln(count) / 10)` of their points, rounded down.
pub fn keep_count(count: usize, min_points_per_object: usize) -> usize {
    if count <= min_points_per_object {
        return count;
    }
    let n = count as f64;
    let ratio = (1.0 - n.ln() / 10.0).max(0.5);
    (n * ratio).floor() as usize
}

/// Picks `count` points from `points`, spreading the picks over space.
///
/// The first point seen in each `sub_grid_size` cell becomes that cell's
/// representative. Too few representatives are topped up with a random
/// sample of the remaining points; too many are randomly cut down to
/// `count`. Never returns more than `points.len()` points.
pub fn uniform_sample<R: Rng + ?Sized>(
    points: &[Point],
    count: usize,
    sub_grid_size: f32,
    rng: &mut R,
) -> Vec<Point> {
    if count >= points.len() {
        return points.to_vec();
    }

    let mut seen: HashSet<GridKey> = HashSet::new();
    let mut representatives = Vec::new();
    for (i, p) in points.iter().enumerate() {
        if seen.insert(GridKey::from_position(&p.position, sub_grid_size)) {
            representatives.push(i);
        }
    }

    if representatives.len() >= count {
        return representatives
            .choose_multiple(rng, count)
            .map(|&i| points[i])
            .collect();
    }

    let mut chosen = vec![false; points.len()];
    for &i in &representatives {
        chosen[i] = true;
    }
    let remaining: Vec<usize> = (0..points.len()).filter(|&i| !chosen[i]).collect();
    let extra = count - representatives.len();

    representatives
        .iter()
        .chain(remaining.choose_multiple(rng, extra))
        .map(|&i| points[i])
        .collect()
}

/// Coarse spatial hash used for best-effort density thinning of a full
/// point set.
///
/// The grid is independent of the ingest voxel grid; a bucket typically
/// covers one physical object or surface patch.
#[derive(Debug, Clone)]
pub struct SpatialDensityIndex {
    config: DensityConfig,
    buckets: HashMap<GridKey, Vec<Point>>,
}

impl SpatialDensityIndex {
    pub fn new(config: DensityConfig) -> Self {
        assert!(
            config.grid_size.is_finite() && config.grid_size > 0.0,
            "grid_size must be > 0 and finite"
        );
        assert!(
            config.sub_grid_size.is_finite() && config.sub_grid_size > 0.0,
            "sub_grid_size must be > 0 and finite"
        );
        Self {
            config,
            buckets: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DensityConfig {
        &self.config
    }

    /// Adds points to their buckets, preserving insertion order within each.
    pub fn insert(&mut self, points: &[Point]) {
        for p in points.iter().filter(|p| p.is_finite()) {
            self.buckets
                .entry(GridKey::from_position(&p.position, self.config.grid_size))
                .or_default()
                .push(*p);
        }
    }

    /// Replaces the whole index with `points`.
    pub fn rebuild(&mut self, points: &[Point]) {
        self.buckets.clear();
        self.insert(points);
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    pub fn bucket(&self, key: &GridKey) -> Option<&[Point]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Drops empty buckets and caps every bucket to its most recent
    /// `2 * min_points_per_object` points.
    pub fn cleanup(&mut self) {
        let cap = 2 * self.config.min_points_per_object;
        let before = self.len();

        self.buckets.retain(|_, bucket| !bucket.is_empty());
        for bucket in self.buckets.values_mut() {
            if bucket.len() > cap {
                bucket.drain(..bucket.len() - cap);
            }
        }

        debug!(
            before,
            after = self.len(),
            buckets = self.buckets.len(),
            "density index cleanup"
        );
    }

    /// Thins every bucket according to [`keep_count`] using a random seed.
    ///
    /// For reproducible results, use [`SpatialDensityIndex::thin_seeded`].
    pub fn thin(&self) -> Vec<Point> {
        let seed = rand::thread_rng().next_u64();
        self.thin_seeded(seed)
    }

    /// Thins every bucket in parallel and concatenates the survivors.
    ///
    /// Buckets are processed in key order and each gets its own RNG derived
    /// from `seed`, so the result is deterministic for a given seed.
    pub fn thin_seeded(&self, seed: u64) -> Vec<Point> {
        let mut keys: Vec<&GridKey> = self.buckets.keys().collect();
        keys.sort_unstable();

        let min_points = self.config.min_points_per_object;
        let sub_grid = self.config.sub_grid_size;

        let kept: Vec<Point> = keys
            .par_iter()
            .enumerate()
            .flat_map_iter(|(i, key)| {
                let bucket = &self.buckets[*key];
                let target = keep_count(bucket.len(), min_points);
                if target >= bucket.len() {
                    return bucket.clone();
                }
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                uniform_sample(bucket, target, sub_grid, &mut rng)
            })
            .collect();

        debug!(input = self.len(), kept = kept.len(), "density thinning");
        kept
    }
}
