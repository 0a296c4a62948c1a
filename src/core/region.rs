//! Axis-aligned regions in discrete index space.
//!
//! A [`Region`] is an `index`/`size` box over a fixed number of axes. Regions
//! describe the three extents every data container tracks (largest possible,
//! buffered, requested) and are the currency of request propagation.

use crate::core::error::{RegionError, RegionResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An N-dimensional index box.
///
/// A region with a zero size on any axis is empty. Pixel order inside a
/// region is row-major with axis 0 varying fastest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    index: Vec<i64>,
    size: Vec<usize>,
}

impl Region {
    /// Create a region from a start index and a size.
    pub fn new(index: Vec<i64>, size: Vec<usize>) -> RegionResult<Self> {
        if index.len() != size.len() {
            return Err(RegionError::DimensionMismatch {
                expected: index.len(),
                got: size.len(),
            });
        }
        Ok(Self { index, size })
    }

    /// Create a region starting at the origin of index space.
    pub fn from_size(size: &[usize]) -> Self {
        Self {
            index: vec![0; size.len()],
            size: size.to_vec(),
        }
    }

    /// Create an empty region of the given dimension.
    pub fn empty(dimension: usize) -> Self {
        Self {
            index: vec![0; dimension],
            size: vec![0; dimension],
        }
    }

    /// Number of axes.
    pub fn dimension(&self) -> usize {
        self.index.len()
    }

    /// Start index.
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// Extent along each axis.
    pub fn size(&self) -> &[usize] {
        &self.size
    }

    /// Exclusive upper bound on an axis.
    pub fn upper_bound(&self, axis: usize) -> i64 {
        self.index[axis] + self.size[axis] as i64
    }

    /// Whether the region holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.size.iter().any(|&s| s == 0)
    }

    /// Total number of pixels.
    pub fn number_of_pixels(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.size.iter().product()
    }

    /// Check that `other` has the same dimension as this region.
    pub fn check_dimension(&self, other: &Region) -> RegionResult<()> {
        if self.dimension() != other.dimension() {
            return Err(RegionError::DimensionMismatch {
                expected: self.dimension(),
                got: other.dimension(),
            });
        }
        Ok(())
    }

    /// Whether `other` lies entirely inside this region.
    ///
    /// An empty region is contained by every region of the same dimension.
    pub fn contains(&self, other: &Region) -> bool {
        if self.dimension() != other.dimension() {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        (0..self.dimension()).all(|axis| {
            self.index[axis] <= other.index[axis]
                && other.upper_bound(axis) <= self.upper_bound(axis)
        })
    }

    /// Whether an index lies inside this region.
    pub fn contains_index(&self, index: &[i64]) -> bool {
        index.len() == self.dimension()
            && !self.is_empty()
            && index
                .iter()
                .enumerate()
                .all(|(axis, &i)| i >= self.index[axis] && i < self.upper_bound(axis))
    }

    /// Overlap of two regions. Disjoint regions give an empty region.
    pub fn intersection(&self, other: &Region) -> Region {
        if self.dimension() != other.dimension() {
            return Region::empty(self.dimension());
        }
        let mut index = Vec::with_capacity(self.dimension());
        let mut size = Vec::with_capacity(self.dimension());
        for axis in 0..self.dimension() {
            let lo = self.index[axis].max(other.index[axis]);
            let hi = self.upper_bound(axis).min(other.upper_bound(axis));
            index.push(lo);
            size.push((hi - lo).max(0) as usize);
        }
        Region { index, size }
    }

    /// Whether the two regions share at least one pixel.
    pub fn intersects(&self, other: &Region) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Crop this region to `bounds`, or `None` when nothing is left.
    pub fn crop_to(&self, bounds: &Region) -> Option<Region> {
        let cropped = self.intersection(bounds);
        if cropped.is_empty() {
            None
        } else {
            Some(cropped)
        }
    }

    /// Smallest region containing both regions. Empty operands are ignored.
    pub fn bounding_union(&self, other: &Region) -> Region {
        if other.is_empty() || self.dimension() != other.dimension() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut index = Vec::with_capacity(self.dimension());
        let mut size = Vec::with_capacity(self.dimension());
        for axis in 0..self.dimension() {
            let lo = self.index[axis].min(other.index[axis]);
            let hi = self.upper_bound(axis).max(other.upper_bound(axis));
            index.push(lo);
            size.push((hi - lo) as usize);
        }
        Region { index, size }
    }

    /// Grow the region by `radius` pixels on both sides of each axis.
    pub fn padded_by(&self, radius: &[usize]) -> Region {
        let mut padded = self.clone();
        for (axis, &r) in radius.iter().enumerate().take(self.dimension()) {
            padded.index[axis] -= r as i64;
            padded.size[axis] += 2 * r;
        }
        padded
    }

    /// Offset of `index` in a row-major buffer covering this region.
    pub fn linear_offset(&self, index: &[i64]) -> Option<usize> {
        if !self.contains_index(index) {
            return None;
        }
        let mut offset = 0usize;
        let mut stride = 1usize;
        for axis in 0..self.dimension() {
            offset += (index[axis] - self.index[axis]) as usize * stride;
            stride *= self.size[axis];
        }
        Some(offset)
    }

    /// Inverse of [`Region::linear_offset`].
    pub fn index_at(&self, mut offset: usize) -> Vec<i64> {
        let mut index = Vec::with_capacity(self.dimension());
        for axis in 0..self.dimension() {
            let extent = self.size[axis].max(1);
            index.push(self.index[axis] + (offset % extent) as i64);
            offset /= extent;
        }
        index
    }

    /// Iterate over every index in the region, axis 0 fastest.
    pub fn indices(&self) -> RegionIndices<'_> {
        RegionIndices {
            region: self,
            current: self.index.clone(),
            remaining: self.number_of_pixels(),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[index={:?}, size={:?}]", self.index, self.size)
    }
}

/// Iterator over the indices of a [`Region`].
pub struct RegionIndices<'a> {
    region: &'a Region,
    current: Vec<i64>,
    remaining: usize,
}

impl Iterator for RegionIndices<'_> {
    type Item = Vec<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.current.clone();
        self.remaining -= 1;
        for axis in 0..self.region.dimension() {
            self.current[axis] += 1;
            if self.current[axis] < self.region.upper_bound(axis) {
                break;
            }
            self.current[axis] = self.region.index[axis];
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RegionIndices<'_> {}
