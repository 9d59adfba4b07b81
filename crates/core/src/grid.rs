/// Integer coordinates of a cubic grid cell.
///
/// Each axis is `floor(coord / cell_size)`, so every point maps to exactly
/// one cell and cells tile space without gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridKey {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl GridKey {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Key of the cell containing `position` for a grid of edge `cell_size`.
    #[inline]
    pub fn from_position(position: &[f32; 3], cell_size: f32) -> Self {
        Self {
            x: (position[0] / cell_size).floor() as i64,
            y: (position[1] / cell_size).floor() as i64,
            z: (position[2] / cell_size).floor() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GridKey;
    use proptest::prelude::*;

    #[test]
    fn negative_coordinates_floor_down() {
        let key = GridKey::from_position(&[-0.01, 0.0, 0.99], 1.0);
        assert_eq!(key, GridKey::new(-1, 0, 0));
    }

    #[test]
    fn cell_boundary_belongs_to_upper_cell() {
        let key = GridKey::from_position(&[0.5, 1.0, -0.5], 0.5);
        assert_eq!(key, GridKey::new(1, 2, -1));
    }

    proptest! {
        #[test]
        fn point_lies_inside_its_cell(
            x in -1000.0f32..1000.0f32,
            y in -1000.0f32..1000.0f32,
            z in -1000.0f32..1000.0f32,
            size in 0.01f32..10.0f32,
        ) {
            let key = GridKey::from_position(&[x, y, z], size);
            for (coord, cell) in [(x, key.x), (y, key.y), (z, key.z)] {
                let scaled = (coord / size) as f64;
                prop_assert!(scaled >= cell as f64);
                prop_assert!(scaled < cell as f64 + 1.0);
            }
        }
    }
}
