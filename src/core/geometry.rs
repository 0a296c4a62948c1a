//! Physical-space geometry of a data container.

use crate::core::error::{GeometryError, GeometryResult};
use crate::core::region::Region;
use serde::{Deserialize, Serialize};

/// Maps discrete indices to physical points.
///
/// `point = origin + direction * (spacing ⊙ index)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalGeometry {
    origin: Vec<f64>,
    spacing: Vec<f64>,
    /// Direction cosines, one row per physical axis.
    direction: Vec<Vec<f64>>,
}

impl PhysicalGeometry {
    /// Create and validate a geometry.
    pub fn new(
        origin: Vec<f64>,
        spacing: Vec<f64>,
        direction: Vec<Vec<f64>>,
    ) -> GeometryResult<Self> {
        let geometry = Self {
            origin,
            spacing,
            direction,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Unit spacing, zero origin, identity direction.
    pub fn identity(dimension: usize) -> Self {
        let direction = (0..dimension)
            .map(|row| {
                (0..dimension)
                    .map(|col| if row == col { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        Self {
            origin: vec![0.0; dimension],
            spacing: vec![1.0; dimension],
            direction,
        }
    }

    /// Replace the spacing.
    pub fn with_spacing(mut self, spacing: Vec<f64>) -> GeometryResult<Self> {
        self.spacing = spacing;
        self.validate()?;
        Ok(self)
    }

    /// Replace the origin.
    pub fn with_origin(mut self, origin: Vec<f64>) -> GeometryResult<Self> {
        self.origin = origin;
        self.validate()?;
        Ok(self)
    }

    /// Replace the direction matrix.
    pub fn with_direction(mut self, direction: Vec<Vec<f64>>) -> GeometryResult<Self> {
        self.direction = direction;
        self.validate()?;
        Ok(self)
    }

    /// Number of axes.
    pub fn dimension(&self) -> usize {
        self.origin.len()
    }

    /// Physical position of index zero.
    pub fn origin(&self) -> &[f64] {
        &self.origin
    }

    /// Distance between samples along each index axis.
    pub fn spacing(&self) -> &[f64] {
        &self.spacing
    }

    /// Direction matrix rows.
    pub fn direction(&self) -> &[Vec<f64>] {
        &self.direction
    }

    /// Check spacing positivity, shapes, and that the direction is invertible.
    pub fn validate(&self) -> GeometryResult<()> {
        let dimension = self.dimension();
        if self.spacing.len() != dimension {
            return Err(GeometryError::DimensionMismatch {
                expected: dimension,
                got: self.spacing.len(),
            });
        }
        if self.direction.len() != dimension {
            return Err(GeometryError::DimensionMismatch {
                expected: dimension,
                got: self.direction.len(),
            });
        }
        if let Some(row) = self.direction.iter().find(|row| row.len() != dimension) {
            return Err(GeometryError::DimensionMismatch {
                expected: dimension,
                got: row.len(),
            });
        }
        for (axis, &value) in self.spacing.iter().enumerate() {
            if !(value.is_finite() && value > 0.0) {
                return Err(GeometryError::NonPositiveSpacing { axis, value });
            }
        }
        self.inverse_direction().map(|_| ())
    }

    /// Physical point of a (possibly fractional) index.
    pub fn continuous_index_to_point(&self, index: &[f64]) -> Vec<f64> {
        let scaled: Vec<f64> = index
            .iter()
            .zip(&self.spacing)
            .map(|(i, s)| i * s)
            .collect();
        self.origin
            .iter()
            .zip(&self.direction)
            .map(|(o, row)| o + row.iter().zip(&scaled).map(|(d, v)| d * v).sum::<f64>())
            .collect()
    }

    /// Physical point of an integer index.
    pub fn index_to_point(&self, index: &[i64]) -> Vec<f64> {
        let continuous: Vec<f64> = index.iter().map(|&i| i as f64).collect();
        self.continuous_index_to_point(&continuous)
    }

    /// Continuous index of a physical point.
    pub fn point_to_continuous_index(&self, point: &[f64]) -> GeometryResult<Vec<f64>> {
        let inverse = self.inverse_direction()?;
        let offset: Vec<f64> = point
            .iter()
            .zip(&self.origin)
            .map(|(p, o)| p - o)
            .collect();
        Ok(inverse
            .iter()
            .zip(&self.spacing)
            .map(|(row, s)| row.iter().zip(&offset).map(|(m, v)| m * v).sum::<f64>() / s)
            .collect())
    }

    /// Continuous index at the center of a region.
    pub fn region_center_index(region: &Region) -> Vec<f64> {
        region
            .index()
            .iter()
            .zip(region.size())
            .map(|(&i, &s)| i as f64 + (s as f64 - 1.0) / 2.0)
            .collect()
    }

    /// Physical point at the center of a region.
    pub fn region_center(&self, region: &Region) -> Vec<f64> {
        self.continuous_index_to_point(&Self::region_center_index(region))
    }

    /// Geometry with spacing multiplied by `factors` and the same direction,
    /// positioned so that `center_index` maps to `center_point`.
    ///
    /// Factors must be at least 1.
    pub fn resampled(&self, factors: &[f64], center_index: &[f64], center_point: &[f64]) -> Self {
        let spacing: Vec<f64> = self
            .spacing
            .iter()
            .zip(factors)
            .map(|(s, f)| s * f.max(1.0))
            .collect();
        let scaled: Vec<f64> = center_index
            .iter()
            .zip(&spacing)
            .map(|(c, s)| c * s)
            .collect();
        let origin = center_point
            .iter()
            .zip(&self.direction)
            .map(|(p, row)| p - row.iter().zip(&scaled).map(|(d, v)| d * v).sum::<f64>())
            .collect();
        Self {
            origin,
            spacing,
            direction: self.direction.clone(),
        }
    }

    /// Inverse of the direction matrix (Gauss-Jordan with partial pivoting).
    pub fn inverse_direction(&self) -> GeometryResult<Vec<Vec<f64>>> {
        let n = self.dimension();
        let mut a: Vec<Vec<f64>> = self.direction.clone();
        let mut inv = PhysicalGeometry::identity(n).direction;

        for col in 0..n {
            let pivot = (col..n)
                .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
                .ok_or(GeometryError::SingularDirection)?;
            if a[pivot][col].abs() < 1e-12 {
                return Err(GeometryError::SingularDirection);
            }
            a.swap(col, pivot);
            inv.swap(col, pivot);

            let scale = a[col][col];
            for k in 0..n {
                a[col][k] /= scale;
                inv[col][k] /= scale;
            }
            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = a[row][col];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..n {
                    a[row][k] -= factor * a[col][k];
                    inv[row][k] -= factor * inv[col][k];
                }
            }
        }
        Ok(inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permuted() -> PhysicalGeometry {
        PhysicalGeometry::new(
            vec![1.0, -2.0, 3.0],
            vec![0.5, 2.7, 7.5],
            vec![
                vec![0.0, -1.0, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![1.0, 0.0, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_identity_mapping() {
        let geometry = PhysicalGeometry::identity(2);
        assert_eq!(geometry.index_to_point(&[3, 4]), vec![3.0, 4.0]);
    }

    #[test]
    fn test_round_trip_with_direction() {
        let geometry = permuted();
        let point = geometry.index_to_point(&[4, 5, 6]);
        assert!((point[0] - (1.0 - 5.0 * 2.7)).abs() < 1e-12);
        assert!((point[1] - (-2.0 + 6.0 * 7.5)).abs() < 1e-12);
        assert!((point[2] - (3.0 + 4.0 * 0.5)).abs() < 1e-12);

        let index = geometry.point_to_continuous_index(&point).unwrap();
        for (got, want) in index.iter().zip([4.0, 5.0, 6.0]) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_bad_spacing() {
        let result = PhysicalGeometry::identity(2).with_spacing(vec![1.0, 0.0]);
        assert_eq!(
            result,
            Err(GeometryError::NonPositiveSpacing {
                axis: 1,
                value: 0.0
            })
        );
    }

    #[test]
    fn test_rejects_singular_direction() {
        let result = PhysicalGeometry::identity(2)
            .with_direction(vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert_eq!(result, Err(GeometryError::SingularDirection));
    }

    #[test]
    fn test_resampled_keeps_center() {
        let geometry = permuted();
        let center = geometry.index_to_point(&[10, 20, 30]);
        let coarse = geometry.resampled(&[2.0, 4.0, 1.0], &[5.0, 5.0, 30.0], &center);

        assert_eq!(coarse.spacing(), &[1.0, 10.8, 7.5]);
        let moved = coarse.continuous_index_to_point(&[5.0, 5.0, 30.0]);
        for (got, want) in moved.iter().zip(&center) {
            assert!((got - want).abs() < 1e-9);
        }
        assert!(coarse.validate().is_ok());
    }

    #[test]
    fn test_region_center() {
        let region = Region::from_size(&[4, 5]);
        let geometry = PhysicalGeometry::identity(2)
            .with_spacing(vec![2.0, 1.0])
            .unwrap();
        assert_eq!(geometry.region_center(&region), vec![3.0, 2.0]);
    }
}
