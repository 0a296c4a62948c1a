//! Multi-resolution pyramid stage.
//!
//! One scalar input, one output per schedule level. Each level's extent and
//! geometry come from [`ScheduleComputer::level_geometry`]; each output pixel
//! is the area-weighted mean of the input over the output pixel's footprint.

use crate::core::container::{DataContainer, PixelType};
use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, ExecutionResult, NodeId, ScheduleError, ScheduleResult};
use crate::core::geometry::PhysicalGeometry;
use crate::core::region::Region;
use crate::core::stage::{Category, ProcessingStage, StageMetadata};
use crate::multires::schedule::{Schedule, ScheduleComputer};
use rayon::prelude::*;
use std::any::Any;

/// Weights below this are treated as no overlap.
const MIN_WEIGHT: f64 = 1e-9;

/// Builds reduced-resolution versions of its input.
#[derive(Debug, Clone)]
pub struct MultiResolutionPyramid {
    computer: ScheduleComputer,
}

impl MultiResolutionPyramid {
    /// Create a pyramid over `dimension` axes with the default schedule.
    pub fn new(dimension: usize) -> ScheduleResult<Self> {
        Ok(Self {
            computer: ScheduleComputer::new(dimension)?,
        })
    }

    /// Create a pyramid with `levels` levels.
    pub fn with_levels(dimension: usize, levels: usize) -> ScheduleResult<Self> {
        let mut pyramid = Self::new(dimension)?;
        pyramid.set_number_of_levels(levels)?;
        Ok(pyramid)
    }

    /// Create a pyramid driven by a configured schedule computer.
    pub fn from_schedule_computer(computer: ScheduleComputer) -> Self {
        Self { computer }
    }

    /// The schedule computer.
    pub fn schedule_computer(&self) -> &ScheduleComputer {
        &self.computer
    }

    /// Current schedule.
    pub fn schedule(&self) -> &Schedule {
        self.computer.schedule()
    }

    /// Number of levels (and outputs).
    pub fn number_of_levels(&self) -> usize {
        self.computer.number_of_levels()
    }

    /// See [`ScheduleComputer::set_number_of_levels`].
    pub fn set_number_of_levels(&mut self, levels: usize) -> ScheduleResult<()> {
        self.computer.set_number_of_levels(levels)
    }

    /// See [`ScheduleComputer::set_starting_shrink_factors`].
    pub fn set_starting_shrink_factors(&mut self, factors: &[u32]) -> ScheduleResult<()> {
        self.computer.set_starting_shrink_factors(factors)
    }

    /// See [`ScheduleComputer::set_schedule`].
    pub fn set_schedule(&mut self, schedule: Schedule) -> ScheduleResult<()> {
        self.computer.set_schedule(schedule)
    }

    fn factors(&self, level: usize) -> ScheduleResult<&[u32]> {
        self.computer
            .schedule()
            .level(level)
            .ok_or(ScheduleError::LevelOutOfRange {
                level,
                levels: self.number_of_levels(),
            })
    }
}

/// Per-axis mapping from output indices to weighted input indices.
struct AxisFootprint {
    input_center: f64,
    output_center: f64,
    factor: f64,
    lower: i64,
    upper: i64,
}

impl AxisFootprint {
    fn new(input: &Region, output: &Region, axis: usize, factor: u32) -> Self {
        let center = |r: &Region| r.index()[axis] as f64 + (r.size()[axis] as f64 - 1.0) / 2.0;
        Self {
            input_center: center(input),
            output_center: center(output),
            factor: f64::from(factor.max(1)),
            lower: input.index()[axis],
            upper: input.upper_bound(axis),
        }
    }

    /// Continuous input interval covered by output index `o`.
    fn interval(&self, o: i64) -> (f64, f64) {
        let x = self.input_center + self.factor * (o as f64 - self.output_center);
        (x - self.factor / 2.0, x + self.factor / 2.0)
    }

    /// Input indices with positive overlap, clamped to the input extent.
    fn support(&self, o: i64) -> (i64, i64) {
        let (a, b) = self.interval(o);
        let lo = ((a - 0.5).floor() as i64 + 1).max(self.lower);
        let hi = ((b + 0.5).ceil() as i64 - 1).min(self.upper - 1);
        (lo, hi)
    }

    /// Normalized overlap weights for output index `o`.
    fn weights(&self, o: i64) -> Vec<(i64, f64)> {
        let (a, b) = self.interval(o);
        let (lo, hi) = self.support(o);
        let mut weights: Vec<(i64, f64)> = (lo..=hi)
            .filter_map(|i| {
                let overlap = (b.min(i as f64 + 0.5) - a.max(i as f64 - 0.5)).max(0.0);
                (overlap > MIN_WEIGHT).then_some((i, overlap))
            })
            .collect();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total > 0.0 {
            for (_, w) in &mut weights {
                *w /= total;
            }
        }
        weights
    }
}

/// Area-weighted box reduction of `input` onto `output` with per-axis factors.
fn reduce(input: &DataContainer, output_region: &Region, output_extent: &Region, factors: &[u32], out: &mut [f32]) {
    let input_extent = input.largest_possible_region();
    let dimension = output_region.dimension();

    // weights[axis][o - start] lists (input index, weight)
    let tables: Vec<Vec<Vec<(i64, f64)>>> = (0..dimension)
        .map(|axis| {
            let footprint = AxisFootprint::new(input_extent, output_extent, axis, factors[axis]);
            (output_region.index()[axis]..output_region.upper_bound(axis))
                .map(|o| footprint.weights(o))
                .collect()
        })
        .collect();

    out.par_iter_mut().enumerate().for_each(|(offset, value)| {
        let index = output_region.index_at(offset);
        let axes: Vec<&[(i64, f64)]> = (0..dimension)
            .map(|axis| {
                let local = (index[axis] - output_region.index()[axis]) as usize;
                tables[axis][local].as_slice()
            })
            .collect();
        if axes.iter().any(|weights| weights.is_empty()) {
            *value = 0.0;
            return;
        }

        // Odometer over the cartesian product of per-axis supports
        let mut cursor = vec![0usize; dimension];
        let mut sample = vec![0i64; dimension];
        let mut sum = 0.0f64;
        loop {
            let mut weight = 1.0;
            for axis in 0..dimension {
                let (i, w) = axes[axis][cursor[axis]];
                sample[axis] = i;
                weight *= w;
            }
            sum += weight * f64::from(input.scalar(&sample).unwrap_or(0.0));

            let mut axis = 0;
            while axis < dimension {
                cursor[axis] += 1;
                if cursor[axis] < axes[axis].len() {
                    break;
                }
                cursor[axis] = 0;
                axis += 1;
            }
            if axis == dimension {
                break;
            }
        }
        *value = sum as f32;
    });
}

impl ProcessingStage for MultiResolutionPyramid {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("multi_resolution_pyramid", "Multi-Resolution Pyramid")
            .category(Category::MultiResolution)
            .description("Reduced-resolution levels of the input, coarsest first")
            .outputs(self.number_of_levels())
            .build()
    }

    fn number_of_outputs(&self) -> usize {
        self.number_of_levels()
    }

    fn generate_output_information(
        &self,
        node_id: NodeId,
        inputs: &[&DataContainer],
        outputs: &mut [DataContainer],
    ) -> ExecutionResult<()> {
        let input = inputs.first().ok_or_else(|| ExecutionError::StageFailed {
            node_id,
            error: "pyramid has no input".to_string(),
        })?;
        for (level, output) in outputs.iter_mut().enumerate() {
            let reduced = self.computer.level_geometry(
                level,
                input.largest_possible_region(),
                input.geometry(),
            )?;
            log::debug!(
                "Pyramid level {}: factors {:?}, region {}",
                level,
                reduced.factors,
                reduced.region
            );
            output.set_pixel_type(PixelType::Scalar);
            output.set_largest_possible_region(reduced.region);
            output.set_geometry(reduced.geometry);
        }
        Ok(())
    }

    fn enlarge_output_requested_region(&self, outputs: &mut [DataContainer]) {
        for output in outputs.iter_mut() {
            output.set_requested_region_to_largest_possible();
        }
    }

    fn generate_input_requested_region(
        &self,
        outputs: &[DataContainer],
        inputs: &[&DataContainer],
    ) -> Vec<Region> {
        let Some(input) = inputs.first() else {
            return Vec::new();
        };
        let input_extent = input.largest_possible_region();
        let mut needed = Region::empty(input_extent.dimension());
        for (level, output) in outputs.iter().enumerate() {
            let requested = output.requested_region();
            let Ok(factors) = self.factors(level) else {
                continue;
            };
            if requested.is_empty() || requested.dimension() != input_extent.dimension() {
                continue;
            }
            let mut index = Vec::with_capacity(requested.dimension());
            let mut size = Vec::with_capacity(requested.dimension());
            for axis in 0..requested.dimension() {
                let footprint = AxisFootprint::new(
                    input_extent,
                    output.largest_possible_region(),
                    axis,
                    factors[axis],
                );
                let (lo, _) = footprint.support(requested.index()[axis]);
                let (_, hi) = footprint.support(requested.upper_bound(axis) - 1);
                index.push(lo);
                size.push((hi - lo + 1).max(0) as usize);
            }
            if let Ok(support) = Region::new(index, size) {
                needed = needed.bounding_union(&support);
            }
        }
        vec![needed]
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let input = ctx.scalar_input(0)?;
        let levels = ctx.output_count();
        for level in 0..levels {
            let factors = self.factors(level)?.to_vec();
            let output = ctx.output(level)?;
            let region = output.buffered_region().clone();
            let extent = output.largest_possible_region().clone();
            let out = ctx.scalar_output_mut(level)?;
            reduce(input, &region, &extent, &factors, out);
            ctx.report_progress((level + 1) as f32 / levels as f32);
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessingStage> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Physical center of a container's largest possible region.
pub fn extent_center(container: &DataContainer) -> Vec<f64> {
    container
        .geometry()
        .region_center(container.largest_possible_region())
}

/// Intensity-weighted physical centroid of a buffered scalar container.
pub fn center_of_mass(container: &DataContainer) -> Option<Vec<f64>> {
    let data = container.scalars()?;
    let region = container.buffered_region();
    let geometry: &PhysicalGeometry = container.geometry();
    let mut total = 0.0f64;
    let mut moment = vec![0.0f64; region.dimension()];
    for (index, &value) in region.indices().zip(data) {
        let weight = f64::from(value);
        if weight == 0.0 {
            continue;
        }
        total += weight;
        for (m, p) in moment.iter_mut().zip(geometry.index_to_point(&index)) {
            *m += weight * p;
        }
    }
    (total != 0.0).then(|| moment.into_iter().map(|m| m / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(size: &[usize], value: impl Fn(&[i64]) -> f32) -> DataContainer {
        let region = Region::from_size(size);
        let data = region.indices().map(|i| value(&i)).collect();
        DataContainer::from_scalars(region, PhysicalGeometry::identity(size.len()), data).unwrap()
    }

    #[test]
    fn test_footprint_at_unit_factor_is_identity() {
        let extent = Region::from_size(&[5]);
        let footprint = AxisFootprint::new(&extent, &extent, 0, 1);
        assert_eq!(footprint.weights(3), vec![(3, 1.0)]);
    }

    #[test]
    fn test_footprint_even_factor() {
        let input = Region::from_size(&[8]);
        let output = Region::from_size(&[4]);
        let footprint = AxisFootprint::new(&input, &output, 0, 2);
        assert_eq!(footprint.weights(0), vec![(0, 0.5), (1, 0.5)]);
        assert_eq!(footprint.support(3), (6, 7));
    }

    #[test]
    fn test_reduce_averages_blocks() {
        let input = container(&[4, 2], |i| (i[0] + 10 * i[1]) as f32);
        let output_extent = Region::from_size(&[2, 1]);
        let mut out = vec![0.0; 2];
        reduce(&input, &output_extent, &output_extent, &[2, 2], &mut out);
        // Mean of {0, 1, 10, 11} and {2, 3, 12, 13}
        assert!((out[0] - 5.5).abs() < 1e-5);
        assert!((out[1] - 7.5).abs() < 1e-5);
    }

    #[test]
    fn test_information_uses_schedule() {
        let pyramid = MultiResolutionPyramid::with_levels(2, 3).unwrap();
        let input = container(&[10, 7], |_| 1.0);
        let mut outputs = vec![DataContainer::placeholder(PixelType::Scalar); 3];
        pyramid
            .generate_output_information(NodeId::new(), &[&input], &mut outputs)
            .unwrap();
        assert_eq!(outputs[0].largest_possible_region().size(), &[2, 1]);
        assert_eq!(outputs[1].largest_possible_region().size(), &[5, 3]);
        assert_eq!(outputs[2].largest_possible_region(), input.largest_possible_region());
        assert_eq!(outputs[0].geometry().spacing(), &[4.0, 4.0]);
    }

    #[test]
    fn test_default_pyramid_is_valid() {
        let pyramid = MultiResolutionPyramid::new(2).unwrap();
        assert!(pyramid.validate(NodeId::new()).is_ok());
        assert_eq!(pyramid.number_of_outputs(), 2);
    }
}
