/// A captured sample: position in the station (or global) frame plus an RGB
/// colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Point {
    pub fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }

    /// Builds a point coloured by its height within `[min_z, max_z]`.
    ///
    /// The normalized height is clamped to `[0.33, 0.66]` and remapped onto a
    /// green-to-blue gradient: the low end of the band is pure blue, the high
    /// end pure green.
    pub fn from_height(position: [f32; 3], min_z: f32, max_z: f32) -> Self {
        let span = max_z - min_z;
        let normalized = if span > 0.0 {
            (position[2] - min_z) / span
        } else {
            0.0
        };
        let clamped = normalized.clamp(BAND_LOW, BAND_HIGH);
        let ratio = (clamped - BAND_LOW) / (BAND_HIGH - BAND_LOW);

        Self {
            position,
            color: [0.0, ratio, 1.0 - ratio],
        }
    }

    pub fn x(&self) -> f32 {
        self.position[0]
    }

    pub fn y(&self) -> f32 {
        self.position[1]
    }

    pub fn z(&self) -> f32 {
        self.position[2]
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
    }
}

const BAND_LOW: f32 = 0.33;
const BAND_HIGH: f32 = 0.66;
