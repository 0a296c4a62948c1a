//! ProcessingStage trait and stage metadata.
//!
//! A stage takes part in the demand-driven update protocol through four steps:
//!
//! 1. **Information** (`generate_output_information`): compute each output's
//!    largest possible region and geometry from the inputs' information. No
//!    buffers are allocated.
//! 2. **Output requests** (`generate_output_requested_region`,
//!    `enlarge_output_requested_region`): make the requested regions of all
//!    outputs consistent with the one a consumer asked for.
//! 3. **Input requests** (`generate_input_requested_region`): derive the input
//!    extent needed to produce the requested outputs.
//! 4. **Data** (`generate_data`): fill the allocated outputs.
//!
//! Every step except data generation has a default implementation for
//! shape-preserving stages.

use crate::core::container::{DataContainer, PixelType};
use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionError, ExecutionResult, NodeId, ValidationError};
use crate::core::region::Region;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Category for organizing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Stages without inputs
    Source,
    /// One output pixel from one input pixel
    Pointwise,
    /// One output pixel from a neighborhood of input pixels
    Neighborhood,
    /// Reduced-resolution outputs
    MultiResolution,
    /// Color mapping
    Color,
    /// Aggregate statistics
    Statistics,
    /// Utility stages
    #[default]
    Utility,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Source => "Source",
            Category::Pointwise => "Pointwise",
            Category::Neighborhood => "Neighborhood",
            Category::MultiResolution => "Multi-resolution",
            Category::Color => "Color",
            Category::Statistics => "Statistics",
            Category::Utility => "Utility",
        }
    }
}

/// Metadata describing a stage type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMetadata {
    /// Unique identifier for this stage type (e.g., "box_mean")
    pub id: String,
    /// Human-readable name (e.g., "Box Mean")
    pub name: String,
    /// Category
    pub category: Category,
    /// Detailed description
    pub description: String,
    /// Number of required inputs
    pub inputs: usize,
    /// Number of outputs
    pub outputs: usize,
    /// Pixel type of every output
    pub output_pixel_type: PixelType,
}

impl StageMetadata {
    /// Create a new metadata builder.
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> StageMetadataBuilder {
        StageMetadataBuilder::new(id, name)
    }
}

/// Builder for StageMetadata.
pub struct StageMetadataBuilder {
    metadata: StageMetadata,
}

impl StageMetadataBuilder {
    /// Create a new builder with required fields.
    ///
    /// Defaults to one scalar input and one scalar output.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: StageMetadata {
                id: id.into(),
                name: name.into(),
                category: Category::default(),
                description: String::new(),
                inputs: 1,
                outputs: 1,
                output_pixel_type: PixelType::Scalar,
            },
        }
    }

    /// Set the category.
    pub fn category(mut self, category: Category) -> Self {
        self.metadata.category = category;
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Set the number of inputs.
    pub fn inputs(mut self, count: usize) -> Self {
        self.metadata.inputs = count;
        self
    }

    /// Set the number of outputs.
    pub fn outputs(mut self, count: usize) -> Self {
        self.metadata.outputs = count;
        self
    }

    /// Set the output pixel type.
    pub fn output_pixel_type(mut self, pixel_type: PixelType) -> Self {
        self.metadata.output_pixel_type = pixel_type;
        self
    }

    /// Build the metadata.
    pub fn build(self) -> StageMetadata {
        self.metadata
    }
}

/// The core trait for processing stages.
///
/// # Thread Safety
///
/// `Send + Sync` bounds let stages parallelize their own per-pixel work.
///
/// # Example Implementation
///
/// ```ignore
/// #[derive(Debug, Clone)]
/// struct Negate;
///
/// impl ProcessingStage for Negate {
///     fn metadata(&self) -> StageMetadata {
///         StageMetadata::builder("negate", "Negate")
///             .category(Category::Pointwise)
///             .build()
///     }
///
///     fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
///         let input = ctx.scalar_input(0)?;
///         let region = ctx.output(0)?.buffered_region().clone();
///         let out = ctx.scalar_output_mut(0)?;
///         for (value, index) in out.iter_mut().zip(region.indices()) {
///             *value = -input.scalar(&index).unwrap_or(0.0);
///         }
///         Ok(())
///     }
///
///     fn clone_box(&self) -> Box<dyn ProcessingStage> { Box::new(self.clone()) }
///     fn as_any(&self) -> &dyn Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn Any { self }
/// }
/// ```
pub trait ProcessingStage: Send + Sync {
    /// Get the metadata for this stage.
    fn metadata(&self) -> StageMetadata;

    /// Number of outputs. Stages whose output count depends on parameters
    /// override this.
    fn number_of_outputs(&self) -> usize {
        self.metadata().outputs
    }

    /// Check parameters before the information pass.
    fn validate(&self, _node_id: NodeId) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Compute each output's largest possible region and geometry.
    ///
    /// Default: copy the information of input 0 to every output. Sources must
    /// override.
    fn generate_output_information(
        &self,
        node_id: NodeId,
        inputs: &[&DataContainer],
        outputs: &mut [DataContainer],
    ) -> ExecutionResult<()> {
        let input = inputs.first().ok_or_else(|| ExecutionError::StageFailed {
            node_id,
            error: "stage has no input to copy information from".to_string(),
        })?;
        for output in outputs.iter_mut() {
            output.copy_information(input);
        }
        Ok(())
    }

    /// Fill the requested regions of the other outputs from `reference`.
    ///
    /// Default: copy the reference request, cropped to each output's extent.
    fn generate_output_requested_region(&self, reference: usize, outputs: &mut [DataContainer]) {
        let Some(requested) = outputs.get(reference).map(|o| o.requested_region().clone()) else {
            return;
        };
        for (k, output) in outputs.iter_mut().enumerate() {
            if k == reference {
                continue;
            }
            let cropped = requested
                .crop_to(output.largest_possible_region())
                .unwrap_or_else(|| Region::empty(output.dimension()));
            output.set_requested_region(cropped);
        }
    }

    /// Grow output requests, e.g. to compute whole outputs at once.
    fn enlarge_output_requested_region(&self, _outputs: &mut [DataContainer]) {}

    /// Input extent needed for the outputs' requested regions, one per input.
    ///
    /// The executor crops the result to each input's largest possible region.
    /// Default: the union of all output requests.
    fn generate_input_requested_region(
        &self,
        outputs: &[DataContainer],
        inputs: &[&DataContainer],
    ) -> Vec<Region> {
        let union = union_of_requests(outputs);
        inputs.iter().map(|_| union.clone()).collect()
    }

    /// Fill the outputs. Each output is allocated over its requested region.
    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()>;

    /// Clone this stage into a boxed trait object.
    fn clone_box(&self) -> Box<dyn ProcessingStage>;

    /// Downcast support for parameter changes.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support for parameter changes.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// Allow cloning Box<dyn ProcessingStage>
impl Clone for Box<dyn ProcessingStage> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Bounding union of every output's requested region.
pub fn union_of_requests(outputs: &[DataContainer]) -> Region {
    outputs
        .iter()
        .map(|o| o.requested_region().clone())
        .reduce(|acc, r| acc.bounding_union(&r))
        .unwrap_or_else(|| Region::empty(0))
}

/// A stage that copies its input to its output.
///
/// Relies entirely on the default shape-preserving policy.
#[derive(Debug, Clone)]
pub struct PassthroughStage;

impl ProcessingStage for PassthroughStage {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("passthrough", "Passthrough")
            .category(Category::Utility)
            .description("Copies the input through unchanged")
            .build()
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let input = ctx.scalar_input(0)?;
        let region = ctx.output(0)?.buffered_region().clone();
        let out = ctx.scalar_output_mut(0)?;
        for (value, index) in out.iter_mut().zip(region.indices()) {
            *value = input.scalar(&index).unwrap_or_default();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::PhysicalGeometry;

    fn info(size: &[usize]) -> DataContainer {
        let mut c = DataContainer::placeholder(PixelType::Scalar);
        c.set_largest_possible_region(Region::from_size(size));
        c.set_geometry(PhysicalGeometry::identity(size.len()));
        c
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = StageMetadata::builder("test_stage", "Test Stage")
            .category(Category::Neighborhood)
            .description("A test stage")
            .inputs(2)
            .outputs(3)
            .build();

        assert_eq!(metadata.id, "test_stage");
        assert_eq!(metadata.category, Category::Neighborhood);
        assert_eq!(metadata.inputs, 2);
        assert_eq!(metadata.outputs, 3);
        assert_eq!(metadata.output_pixel_type, PixelType::Scalar);
    }

    #[test]
    fn test_default_information_copies_input() {
        let input = info(&[5, 6]);
        let mut outputs = vec![DataContainer::placeholder(PixelType::Scalar)];
        PassthroughStage
            .generate_output_information(NodeId::new(), &[&input], &mut outputs)
            .unwrap();
        assert_eq!(outputs[0].largest_possible_region(), input.largest_possible_region());
    }

    #[test]
    fn test_default_information_needs_input() {
        let mut outputs = vec![DataContainer::placeholder(PixelType::Scalar)];
        let result = PassthroughStage.generate_output_information(NodeId::new(), &[], &mut outputs);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_output_requests_are_cropped() {
        let mut outputs = vec![info(&[10, 10]), info(&[4, 4])];
        outputs[0].set_requested_region(Region::new(vec![2, 2], vec![5, 5]).unwrap());
        PassthroughStage.generate_output_requested_region(0, &mut outputs);
        assert_eq!(
            outputs[1].requested_region(),
            &Region::new(vec![2, 2], vec![2, 2]).unwrap()
        );
    }

    #[test]
    fn test_default_input_request_copies_output_request() {
        let input = info(&[10, 10]);
        let mut outputs = vec![info(&[10, 10])];
        let wanted = Region::new(vec![1, 2], vec![3, 4]).unwrap();
        outputs[0].set_requested_region(wanted.clone());
        let regions = PassthroughStage.generate_input_requested_region(&outputs, &[&input]);
        assert_eq!(regions, vec![wanted]);
    }
}
