use hashbrown::HashMap;
use stationcloud_core::{GridKey, Point};

#[derive(Default, Clone, Copy)]
struct VoxelAccum {
    position: [f64; 3],
    color: [f64; 3],
    n: usize,
}

/// Reduces `points` to one centroid per occupied voxel.
///
/// Position and colour of each output point are the means over the points
/// that fall into that voxel. Points with a non-finite coordinate are
/// skipped. Output is ordered by voxel key, so it depends only on the set of
/// input points and not on their order (up to float rounding).
pub fn voxel_downsample(points: &[Point], voxel_size: f32) -> Vec<Point> {
    assert!(
        voxel_size.is_finite() && voxel_size > 0.0,
        "voxel_size must be > 0 and finite"
    );

    if points.is_empty() {
        return Vec::new();
    }

    let mut bins: HashMap<GridKey, VoxelAccum> = HashMap::new();

    for p in points {
        if !p.is_finite() {
            continue;
        }

        let entry = bins
            .entry(GridKey::from_position(&p.position, voxel_size))
            .or_default();
        for axis in 0..3 {
            entry.position[axis] += p.position[axis] as f64;
            entry.color[axis] += p.color[axis] as f64;
        }
        entry.n += 1;
    }

    let mut cells: Vec<(GridKey, VoxelAccum)> = bins.into_iter().collect();
    cells.sort_unstable_by_key(|(key, _)| *key);

    cells
        .into_iter()
        .map(|(_, a)| {
            let denom = a.n as f64;
            Point::new(
                a.position.map(|s| (s / denom) as f32),
                a.color.map(|s| (s / denom) as f32),
            )
        })
        .collect()
}
