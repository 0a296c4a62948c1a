//! Pointwise stages: ShiftScale

use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionResult, NodeId, ValidationError};
use crate::core::stage::{Category, ProcessingStage, StageMetadata};
use crate::filters::registry::StageRegistry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Register pointwise stages.
pub fn register(registry: &mut StageRegistry) {
    registry.register(|| Box::new(ShiftScale::default()));
}

/// Computes `(value + shift) * scale` for every pixel.
///
/// Uses the default shape-preserving propagation: the input request equals
/// the output request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShiftScale {
    shift: f32,
    scale: f32,
}

impl ShiftScale {
    /// Create a shift-scale stage.
    pub fn new(shift: f32, scale: f32) -> Self {
        Self { shift, scale }
    }

    pub fn shift(&self) -> f32 {
        self.shift
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_shift(&mut self, shift: f32) {
        self.shift = shift;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// Apply to a single value.
    pub fn apply(&self, value: f32) -> f32 {
        (value + self.shift) * self.scale
    }
}

impl Default for ShiftScale {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl ProcessingStage for ShiftScale {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("shift_scale", "Shift Scale")
            .description("Adds a shift to every pixel and multiplies by a scale")
            .category(Category::Pointwise)
            .build()
    }

    fn validate(&self, node_id: NodeId) -> Result<(), ValidationError> {
        for (name, value) in [("shift", self.shift), ("scale", self.scale)] {
            if !value.is_finite() {
                return Err(ValidationError::InvalidParameter {
                    node_id,
                    parameter: name.to_string(),
                    error: format!("must be finite, got {}", value),
                });
            }
        }
        Ok(())
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let input = ctx.scalar_input(0)?;
        let region = ctx.output(0)?.buffered_region().clone();

        // Fast path when the input buffer lines up with the output.
        if input.buffered_region() == &region {
            let source = input.scalars().unwrap_or_default();
            let out = ctx.scalar_output_mut(0)?;
            out.par_iter_mut()
                .zip(source.par_iter())
                .for_each(|(o, &v)| *o = self.apply(v));
        } else {
            let out = ctx.scalar_output_mut(0)?;
            out.par_iter_mut().enumerate().for_each(|(offset, o)| {
                let index = region.index_at(offset);
                *o = self.apply(input.scalar(&index).unwrap_or_default());
            });
        }

        ctx.report_progress(1.0);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ProcessingStage> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::DataContainer;
    use crate::core::geometry::PhysicalGeometry;
    use crate::core::region::Region;

    #[test]
    fn test_metadata() {
        let metadata = ShiftScale::default().metadata();
        assert_eq!(metadata.id, "shift_scale");
        assert_eq!(metadata.category, Category::Pointwise);
        assert_eq!(metadata.inputs, 1);
    }

    #[test]
    fn test_apply() {
        assert_eq!(ShiftScale::new(1.0, 2.0).apply(3.0), 8.0);
        assert_eq!(ShiftScale::default().apply(-4.5), -4.5);
    }

    #[test]
    fn test_rejects_non_finite_scale() {
        let stage = ShiftScale::new(0.0, f32::NAN);
        assert!(stage.validate(NodeId::new()).is_err());
    }

    #[test]
    fn test_generates_subregion_of_larger_input() {
        let input = DataContainer::from_scalars(
            Region::from_size(&[4]),
            PhysicalGeometry::identity(1),
            vec![0.0, 1.0, 2.0, 3.0],
        )
        .unwrap();

        let mut outputs = vec![DataContainer::placeholder(crate::core::container::PixelType::Scalar)];
        outputs[0].copy_information(&input);
        outputs[0].set_requested_region(Region::new(vec![1], vec![2]).unwrap());
        outputs[0].allocate();

        let progress = |_: f32| {};
        let mut ctx = ExecutionContext::new(NodeId::new(), vec![&input], &mut outputs, &progress);
        ShiftScale::new(1.0, 2.0).generate_data(&mut ctx).unwrap();

        assert_eq!(outputs[0].scalars().unwrap(), &[4.0, 6.0]);
    }
}
