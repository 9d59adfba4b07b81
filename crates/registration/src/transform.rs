use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use rayon::prelude::*;
use stationcloud_core::Point;
use tracing::warn;

/// Point sets at least this large are transformed in parallel.
const PARALLEL_THRESHOLD: usize = 10_000;

/// A 4×4 homogeneous rigid transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    matrix: Matrix4<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformParseError {
    #[error("malformed transform: expected at least 16 numeric tokens, found {found}")]
    Malformed { found: usize },
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn from_matrix(matrix: Matrix4<f32>) -> Self {
        Self { matrix }
    }

    /// Builds a transform from four rows of four values.
    pub fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Self {
            matrix: Matrix4::from_fn(|r, c| rows[r][c]),
        }
    }

    pub fn from_rotation_translation(rotation: [[f32; 3]; 3], translation: [f32; 3]) -> Self {
        let mut matrix = Matrix4::identity();
        for r in 0..3 {
            for c in 0..3 {
                matrix[(r, c)] = rotation[r][c];
            }
            matrix[(r, 3)] = translation[r];
        }
        Self { matrix }
    }

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        Self {
            matrix: Matrix4::new_translation(&Vector3::new(x, y, z)),
        }
    }

    /// Rotation about the z axis by `angle` radians.
    pub fn rotation_z(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rotation_translation([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]], [0.0; 3])
    }

    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.matrix
    }

    pub fn to_rows(&self) -> [[f32; 4]; 4] {
        let m = &self.matrix;
        [0, 1, 2, 3].map(|r| [m[(r, 0)], m[(r, 1)], m[(r, 2)], m[(r, 3)]])
    }

    /// The translation column.
    pub fn translation_part(&self) -> [f32; 3] {
        [self.matrix[(0, 3)], self.matrix[(1, 3)], self.matrix[(2, 3)]]
    }

    pub fn is_identity(&self, eps: f32) -> bool {
        (self.matrix - Matrix4::identity()).iter().all(|v| v.abs() <= eps)
    }

    /// Inverse transform.
    ///
    /// A singular matrix cannot come from a true rigid motion; in that case
    /// the upper 3×3 block is treated as a rotation and inverted as
    /// `[Rᵀ | -Rᵀt]`.
    pub fn inverse(&self) -> Self {
        if let Some(matrix) = self.matrix.try_inverse() {
            return Self { matrix };
        }

        warn!("singular transform, falling back to rigid inverse");
        let rotation: Matrix3<f32> = self.matrix.fixed_view::<3, 3>(0, 0).transpose();
        let t = rotation * -Vector3::from(self.translation_part());
        let mut matrix = Matrix4::identity();
        matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
        Self { matrix }
    }

    /// Matrix product `self · rhs`: the result applies `rhs` first, then
    /// `self`.
    pub fn compose(&self, rhs: &RigidTransform) -> RigidTransform {
        Self {
            matrix: self.matrix * rhs.matrix,
        }
    }

    /// `(M · [x, y, z, 1]ᵀ)[0..3]`
    #[inline]
    pub fn apply_to_position(&self, p: &[f32; 3]) -> [f32; 3] {
        let v = self.matrix * Vector4::new(p[0], p[1], p[2], 1.0);
        [v[0], v[1], v[2]]
    }

    /// Transforms the position of `point`; colour is unchanged.
    #[inline]
    pub fn apply_to_point(&self, point: &Point) -> Point {
        Point::new(self.apply_to_position(&point.position), point.color)
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> RigidTransform {
        self.compose(&rhs)
    }
}

/// Parses a whitespace separated, row-major 4×4 matrix.
///
/// Tokens that are not numbers are skipped. The first 16 numeric tokens are
/// used; anything after them is ignored.
impl FromStr for RigidTransform {
    type Err = TransformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<f32> = s
            .split_whitespace()
            .filter_map(|token| token.parse::<f32>().ok())
            .collect();

        if values.len() < 16 {
            return Err(TransformParseError::Malformed {
                found: values.len(),
            });
        }

        Ok(Self {
            matrix: Matrix4::from_row_slice(&values[..16]),
        })
    }
}

impl fmt::Display for RigidTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.to_rows() {
            writeln!(f, "{} {} {} {}", row[0], row[1], row[2], row[3])?;
        }
        Ok(())
    }
}

/// Apply a rigid transform to every point, returning a new set in the same
/// order.
pub fn apply_transform(points: &[Point], transform: &RigidTransform) -> Vec<Point> {
    if points.len() >= PARALLEL_THRESHOLD {
        points
            .par_iter()
            .map(|p| transform.apply_to_point(p))
            .collect()
    } else {
        points.iter().map(|p| transform.apply_to_point(p)).collect()
    }
}
