use crate::Point;

/// Colours a batch of raw positions by height.
///
/// The z range is taken over the batch itself; a flat batch is treated as the
/// range `[min, min + 1]`.
pub fn colorize_by_height(positions: &[[f32; 3]]) -> Vec<Point> {
    if positions.is_empty() {
        return Vec::new();
    }

    let (mut min_z, mut max_z) = (f32::MAX, f32::MIN);
    for p in positions {
        if p[2].is_finite() {
            min_z = min_z.min(p[2]);
            max_z = max_z.max(p[2]);
        }
    }
    if max_z <= min_z {
        max_z = min_z + 1.0;
    }

    positions
        .iter()
        .map(|&p| Point::from_height(p, min_z, max_z))
        .collect()
}

const HEAT_STOPS: [[f32; 3]; 5] = [
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
];

/// Maps `value` in `[0, 1]` onto a blue, cyan, green, yellow, red ramp.
///
/// Values outside the unit interval are clamped. Renderers use it for
/// overlays such as budget occupancy.
pub fn heat_map_color(value: f32) -> [u8; 3] {
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    let segment = 1.0 / (HEAT_STOPS.len() - 1) as f32;
    let index = ((v / segment) as usize).min(HEAT_STOPS.len() - 1);
    let weight = (v - index as f32 * segment) / segment;

    let lo = HEAT_STOPS[index];
    let hi = HEAT_STOPS[(index + 1).min(HEAT_STOPS.len() - 1)];

    let mut out = [0u8; 3];
    for c in 0..3 {
        let channel = lo[c] + weight * (hi[c] - lo[c]);
        out[c] = (channel.clamp(0.0, 1.0) * 255.0) as u8;
    }
    out
}
