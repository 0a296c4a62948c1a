//! N-dimensional data containers.
//!
//! A [`DataContainer`] is the unit of data flowing between stages. Besides its
//! pixel buffer it tracks three regions:
//!
//! - **largest possible**: the full theoretical extent, set by the information pass
//! - **buffered**: the extent currently backed by valid pixels
//! - **requested**: the extent a downstream consumer needs next
//!
//! The buffer always covers exactly the buffered region.

use crate::core::geometry::PhysicalGeometry;
use crate::core::region::Region;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel representation of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelType {
    /// One `f32` sample per pixel.
    Scalar,
    /// Three `u8` channels per pixel.
    Rgb,
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelType::Scalar => write!(f, "scalar"),
            PixelType::Rgb => write!(f, "rgb"),
        }
    }
}

/// Typed pixel storage.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    /// Scalar samples.
    Scalar(Vec<f32>),
    /// RGB samples.
    Rgb(Vec<[u8; 3]>),
}

impl PixelBuffer {
    /// Zero-filled buffer of `len` pixels.
    pub fn zeros(pixel_type: PixelType, len: usize) -> Self {
        match pixel_type {
            PixelType::Scalar => PixelBuffer::Scalar(vec![0.0; len]),
            PixelType::Rgb => PixelBuffer::Rgb(vec![[0; 3]; len]),
        }
    }

    /// Pixel type held by this buffer.
    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelBuffer::Scalar(_) => PixelType::Scalar,
            PixelBuffer::Rgb(_) => PixelType::Rgb,
        }
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::Scalar(data) => data.len(),
            PixelBuffer::Rgb(data) => data.len(),
        }
    }

    /// Whether the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An N-dimensional array with region bookkeeping and physical geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct DataContainer {
    largest_possible_region: Region,
    buffered_region: Region,
    requested_region: Region,
    geometry: PhysicalGeometry,
    buffer: PixelBuffer,
}

impl DataContainer {
    /// Create an output placeholder with no extent and no data.
    pub fn placeholder(pixel_type: PixelType) -> Self {
        Self {
            largest_possible_region: Region::empty(0),
            buffered_region: Region::empty(0),
            requested_region: Region::empty(0),
            geometry: PhysicalGeometry::identity(0),
            buffer: PixelBuffer::zeros(pixel_type, 0),
        }
    }

    /// Create a fully buffered scalar container.
    ///
    /// Returns `None` when `data` does not match the region's pixel count or
    /// the geometry's dimension does not match the region.
    pub fn from_scalars(region: Region, geometry: PhysicalGeometry, data: Vec<f32>) -> Option<Self> {
        Self::from_buffer(region, geometry, PixelBuffer::Scalar(data))
    }

    /// Create a fully buffered container from any buffer.
    pub fn from_buffer(region: Region, geometry: PhysicalGeometry, buffer: PixelBuffer) -> Option<Self> {
        if buffer.len() != region.number_of_pixels() || geometry.dimension() != region.dimension() {
            return None;
        }
        Some(Self {
            largest_possible_region: region.clone(),
            buffered_region: region.clone(),
            requested_region: region,
            geometry,
            buffer,
        })
    }

    /// Number of axes.
    pub fn dimension(&self) -> usize {
        self.largest_possible_region.dimension()
    }

    /// Pixel type of the buffer.
    pub fn pixel_type(&self) -> PixelType {
        self.buffer.pixel_type()
    }

    /// Change the pixel type. Drops any buffered data.
    pub fn set_pixel_type(&mut self, pixel_type: PixelType) {
        if self.pixel_type() != pixel_type {
            self.buffer = PixelBuffer::zeros(pixel_type, 0);
            self.buffered_region = Region::empty(self.dimension());
        }
    }

    /// Full theoretical extent.
    pub fn largest_possible_region(&self) -> &Region {
        &self.largest_possible_region
    }

    /// Set the full theoretical extent.
    pub fn set_largest_possible_region(&mut self, region: Region) {
        self.largest_possible_region = region;
    }

    /// Extent backed by valid data.
    pub fn buffered_region(&self) -> &Region {
        &self.buffered_region
    }

    /// Extent currently needed downstream.
    pub fn requested_region(&self) -> &Region {
        &self.requested_region
    }

    /// Set the extent needed downstream.
    pub fn set_requested_region(&mut self, region: Region) {
        self.requested_region = region;
    }

    /// Request the whole largest possible region.
    pub fn set_requested_region_to_largest_possible(&mut self) {
        self.requested_region = self.largest_possible_region.clone();
    }

    /// Physical geometry.
    pub fn geometry(&self) -> &PhysicalGeometry {
        &self.geometry
    }

    /// Replace the physical geometry.
    pub fn set_geometry(&mut self, geometry: PhysicalGeometry) {
        self.geometry = geometry;
    }

    /// Copy extent and geometry from another container.
    pub fn copy_information(&mut self, other: &DataContainer) {
        self.largest_possible_region = other.largest_possible_region.clone();
        self.geometry = other.geometry.clone();
    }

    /// Whether the requested region lies inside the largest possible region.
    pub fn verify_requested_region(&self) -> bool {
        self.largest_possible_region.contains(&self.requested_region)
    }

    /// Whether buffered data covers the requested region.
    pub fn is_request_satisfied(&self) -> bool {
        self.buffered_region.contains(&self.requested_region)
    }

    /// Allocate a zeroed buffer over the requested region and mark it buffered.
    pub fn allocate(&mut self) {
        let pixel_type = self.pixel_type();
        self.buffer = PixelBuffer::zeros(pixel_type, self.requested_region.number_of_pixels());
        self.buffered_region = self.requested_region.clone();
    }

    /// Drop the buffer; nothing is buffered afterwards.
    pub fn release_data(&mut self) {
        let pixel_type = self.pixel_type();
        self.buffer = PixelBuffer::zeros(pixel_type, 0);
        self.buffered_region = Region::empty(self.dimension());
    }

    /// Whether any data is buffered.
    pub fn has_data(&self) -> bool {
        !self.buffered_region.is_empty()
    }

    /// Check the region invariants, describing the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !self.largest_possible_region.contains(&self.buffered_region) {
            return Err(format!(
                "buffered region {} exceeds largest possible region {}",
                self.buffered_region, self.largest_possible_region
            ));
        }
        if self.buffer.len() != self.buffered_region.number_of_pixels() {
            return Err(format!(
                "buffer holds {} pixels but buffered region {} needs {}",
                self.buffer.len(),
                self.buffered_region,
                self.buffered_region.number_of_pixels()
            ));
        }
        Ok(())
    }

    /// Raw buffer.
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Scalar samples over the buffered region.
    pub fn scalars(&self) -> Option<&[f32]> {
        match &self.buffer {
            PixelBuffer::Scalar(data) => Some(data),
            PixelBuffer::Rgb(_) => None,
        }
    }

    /// Mutable scalar samples over the buffered region.
    pub fn scalars_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.buffer {
            PixelBuffer::Scalar(data) => Some(data),
            PixelBuffer::Rgb(_) => None,
        }
    }

    /// RGB samples over the buffered region.
    pub fn rgb_pixels(&self) -> Option<&[[u8; 3]]> {
        match &self.buffer {
            PixelBuffer::Rgb(data) => Some(data),
            PixelBuffer::Scalar(_) => None,
        }
    }

    /// Mutable RGB samples over the buffered region.
    pub fn rgb_pixels_mut(&mut self) -> Option<&mut [[u8; 3]]> {
        match &mut self.buffer {
            PixelBuffer::Rgb(data) => Some(data),
            PixelBuffer::Scalar(_) => None,
        }
    }

    /// Scalar at a global index, if buffered.
    pub fn scalar(&self, index: &[i64]) -> Option<f32> {
        let offset = self.buffered_region.linear_offset(index)?;
        self.scalars().map(|data| data[offset])
    }

    /// RGB value at a global index, if buffered.
    pub fn rgb(&self, index: &[i64]) -> Option<[u8; 3]> {
        let offset = self.buffered_region.linear_offset(index)?;
        self.rgb_pixels().map(|data| data[offset])
    }

    /// Copy the pixels of `region` out of this container into a new one.
    ///
    /// The extent and geometry are kept; only `region` ends up buffered.
    pub fn extract(&self, region: &Region) -> Option<DataContainer> {
        if !self.buffered_region.contains(region) {
            return None;
        }
        let buffer = match &self.buffer {
            PixelBuffer::Scalar(data) => PixelBuffer::Scalar(
                region
                    .indices()
                    .filter_map(|i| self.buffered_region.linear_offset(&i).map(|o| data[o]))
                    .collect(),
            ),
            PixelBuffer::Rgb(data) => PixelBuffer::Rgb(
                region
                    .indices()
                    .filter_map(|i| self.buffered_region.linear_offset(&i).map(|o| data[o]))
                    .collect(),
            ),
        };
        Some(DataContainer {
            largest_possible_region: self.largest_possible_region.clone(),
            buffered_region: region.clone(),
            requested_region: region.clone(),
            geometry: self.geometry.clone(),
            buffer,
        })
    }
}
