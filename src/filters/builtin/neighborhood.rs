//! Neighborhood stages: BoxMean

use crate::core::container::DataContainer;
use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, ExecutionResult, NodeId, ValidationError};
use crate::core::region::Region;
use crate::core::stage::{union_of_requests, Category, ProcessingStage, StageMetadata};
use crate::filters::registry::StageRegistry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Register neighborhood stages.
pub fn register(registry: &mut StageRegistry) {
    registry.register(|| Box::new(BoxMean::uniform(1)));
}

/// Mean over an axis-aligned box of `2 * radius + 1` pixels per axis.
///
/// The input request is the output request padded by the radius and then
/// cropped to the input extent, so pixels near the border average over the
/// part of the box that exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxMean {
    radius: Vec<usize>,
}

impl BoxMean {
    /// Per-axis radius.
    pub fn new(radius: Vec<usize>) -> Self {
        Self { radius }
    }

    /// Same radius on every axis.
    pub fn uniform(radius: usize) -> Self {
        Self::new(vec![radius])
    }

    pub fn radius(&self) -> &[usize] {
        &self.radius
    }

    pub fn set_radius(&mut self, radius: Vec<usize>) {
        self.radius = radius;
    }

    /// Radius expanded to `dimension` axes. A single radius applies to all.
    fn radius_for(&self, dimension: usize) -> Option<Vec<usize>> {
        match self.radius.as_slice() {
            [r] => Some(vec![*r; dimension]),
            radius if radius.len() == dimension => Some(radius.to_vec()),
            _ => None,
        }
    }
}

impl ProcessingStage for BoxMean {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("box_mean", "Box Mean")
            .description("Averages each pixel over a box-shaped neighborhood")
            .category(Category::Neighborhood)
            .build()
    }

    fn validate(&self, node_id: NodeId) -> Result<(), ValidationError> {
        if self.radius.is_empty() {
            return Err(ValidationError::InvalidParameter {
                node_id,
                parameter: "radius".to_string(),
                error: "at least one radius is required".to_string(),
            });
        }
        Ok(())
    }

    fn generate_output_information(
        &self,
        node_id: NodeId,
        inputs: &[&DataContainer],
        outputs: &mut [DataContainer],
    ) -> ExecutionResult<()> {
        let input = inputs.first().ok_or_else(|| ExecutionError::StageFailed {
            node_id,
            error: "box mean needs an input".to_string(),
        })?;
        if self.radius_for(input.dimension()).is_none() {
            return Err(ExecutionError::StageFailed {
                node_id,
                error: format!(
                    "radius has {} entries but the input has {} axes",
                    self.radius.len(),
                    input.dimension()
                ),
            });
        }
        for output in outputs.iter_mut() {
            output.copy_information(input);
        }
        Ok(())
    }

    fn generate_input_requested_region(
        &self,
        outputs: &[DataContainer],
        inputs: &[&DataContainer],
    ) -> Vec<Region> {
        let union = union_of_requests(outputs);
        let padded = match self.radius_for(union.dimension()) {
            Some(radius) if !union.is_empty() => union.padded_by(&radius),
            _ => union,
        };
        inputs.iter().map(|_| padded.clone()).collect()
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let input = ctx.scalar_input(0)?;
        let region = ctx.output(0)?.buffered_region().clone();
        let radius = self
            .radius_for(region.dimension())
            .ok_or_else(|| ctx.failure("radius does not match the input dimension"))?;

        let window: Vec<usize> = radius.iter().map(|r| 2 * r + 1).collect();
        let window = Region::from_size(&window);

        let out = ctx.scalar_output_mut(0)?;
        out.par_iter_mut().enumerate().for_each(|(offset, value)| {
            let center = region.index_at(offset);
            let mut sum = 0.0f64;
            let mut count = 0usize;
            let mut neighbor = vec![0i64; center.len()];
            for relative in window.indices() {
                for (axis, n) in neighbor.iter_mut().enumerate() {
                    *n = center[axis] + relative[axis] - radius[axis] as i64;
                }
                if let Some(v) = input.scalar(&neighbor) {
                    sum += v as f64;
                    count += 1;
                }
            }
            *value = if count == 0 { 0.0 } else { (sum / count as f64) as f32 };
        });

        ctx.report_progress(1.0);
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
