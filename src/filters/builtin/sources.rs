//! Source stages: SyntheticSource, ContainerSource

use crate::core::container::DataContainer;
use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionResult, NodeId, ValidationError};
use crate::core::geometry::PhysicalGeometry;
use crate::core::region::Region;
use crate::core::stage::{Category, ProcessingStage, StageMetadata};
use crate::filters::registry::StageRegistry;
use rayon::prelude::*;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Register source stages.
pub fn register(registry: &mut StageRegistry) {
    registry.register(|| Box::new(SyntheticSource::constant(&[64, 64], 0.0)));
}

/// Value of a synthetic pixel as a function of its global index.
pub type Generator = Arc<dyn Fn(&[i64]) -> f32 + Send + Sync>;

/// A source whose pixels are computed from their index.
///
/// Only the requested region is generated, so tests can observe exactly how
/// much of the source a downstream request pulled in.
#[derive(Clone)]
pub struct SyntheticSource {
    region: Region,
    geometry: PhysicalGeometry,
    generator: Generator,
}

impl SyntheticSource {
    /// Create a source over `region` with the given geometry and generator.
    pub fn new<F>(region: Region, geometry: PhysicalGeometry, generator: F) -> Self
    where
        F: Fn(&[i64]) -> f32 + Send + Sync + 'static,
    {
        Self {
            region,
            geometry,
            generator: Arc::new(generator),
        }
    }

    /// Source where each pixel holds its linear offset in the extent.
    pub fn ramp(size: &[usize]) -> Self {
        let region = Region::from_size(size);
        let extent = region.clone();
        Self::new(region, PhysicalGeometry::identity(size.len()), move |index| {
            extent.linear_offset(index).map_or(0.0, |o| o as f32)
        })
    }

    /// Source filled with a single value.
    pub fn constant(size: &[usize], value: f32) -> Self {
        Self::new(
            Region::from_size(size),
            PhysicalGeometry::identity(size.len()),
            move |_| value,
        )
    }

    /// Replace the geometry.
    pub fn with_geometry(mut self, geometry: PhysicalGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Extent produced by this source.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Geometry of the produced container.
    pub fn geometry(&self) -> &PhysicalGeometry {
        &self.geometry
    }

    /// Replace the extent.
    pub fn set_region(&mut self, region: Region) {
        self.region = region;
    }

    /// Replace the geometry.
    pub fn set_geometry(&mut self, geometry: PhysicalGeometry) {
        self.geometry = geometry;
    }

    /// Replace the pixel generator.
    pub fn set_generator<F>(&mut self, generator: F)
    where
        F: Fn(&[i64]) -> f32 + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
    }
}

impl fmt::Debug for SyntheticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntheticSource")
            .field("region", &self.region)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

impl ProcessingStage for SyntheticSource {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("synthetic_source", "Synthetic Source")
            .description("Generates pixels from a function of their index")
            .category(Category::Source)
            .inputs(0)
            .build()
    }

    fn validate(&self, node_id: NodeId) -> Result<(), ValidationError> {
        if self.region.is_empty() {
            return Err(ValidationError::InvalidParameter {
                node_id,
                parameter: "region".to_string(),
                error: "extent must not be empty".to_string(),
            });
        }
        if self.geometry.dimension() != self.region.dimension() {
            return Err(ValidationError::InvalidParameter {
                node_id,
                parameter: "geometry".to_string(),
                error: format!(
                    "geometry has {} axes but the extent has {}",
                    self.geometry.dimension(),
                    self.region.dimension()
                ),
            });
        }
        self.geometry
            .validate()
            .map_err(|e| ValidationError::InvalidParameter {
                node_id,
                parameter: "geometry".to_string(),
                error: e.to_string(),
            })
    }

    fn generate_output_information(
        &self,
        _node_id: NodeId,
        _inputs: &[&DataContainer],
        outputs: &mut [DataContainer],
    ) -> ExecutionResult<()> {
        for output in outputs.iter_mut() {
            output.set_largest_possible_region(self.region.clone());
            output.set_geometry(self.geometry.clone());
        }
        Ok(())
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let region = ctx.output(0)?.buffered_region().clone();
        let generator = &self.generator;
        let data = ctx.scalar_output_mut(0)?;

        data.par_iter_mut().enumerate().for_each(|(offset, value)| {
            *value = generator(&region.index_at(offset));
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

/// Feeds an existing, fully buffered container into a pipeline.
#[derive(Debug, Clone)]
pub struct ContainerSource {
    container: Arc<DataContainer>,
}

impl ContainerSource {
    /// Wrap a container.
    pub fn new(container: DataContainer) -> Self {
        Self {
            container: Arc::new(container),
        }
    }

    /// Wrap a shared container.
    pub fn from_shared(container: Arc<DataContainer>) -> Self {
        Self { container }
    }

    /// The wrapped container.
    pub fn container(&self) -> &DataContainer {
        &self.container
    }
}

impl ProcessingStage for ContainerSource {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("container_source", "Container Source")
            .description("Provides an in-memory container as pipeline input")
            .category(Category::Source)
            .inputs(0)
            .output_pixel_type(self.container.pixel_type())
            .build()
    }

    fn validate(&self, node_id: NodeId) -> Result<(), ValidationError> {
        if self.container.buffered_region() != self.container.largest_possible_region() {
            return Err(ValidationError::InvalidParameter {
                node_id,
                parameter: "container".to_string(),
                error: "container must be fully buffered".to_string(),
            });
        }
        Ok(())
    }

    fn generate_output_information(
        &self,
        _node_id: NodeId,
        _inputs: &[&DataContainer],
        outputs: &mut [DataContainer],
    ) -> ExecutionResult<()> {
        for output in outputs.iter_mut() {
            output.set_pixel_type(self.container.pixel_type());
            output.copy_information(&self.container);
        }
        Ok(())
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let requested = ctx.output(0)?.requested_region().clone();
        let extracted = self.container.extract(&requested).ok_or_else(|| {
            ctx.failure(format!(
                "requested region {} is not buffered in the wrapped container",
                requested
            ))
        })?;
        *ctx.output_mut(0)? = extracted;
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
