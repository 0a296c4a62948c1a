//! File I/O stages: FileSource

use crate::core::container::DataContainer;
use crate::core::context::ExecutionContext;
use crate::core::error::{ExecutionResult, NodeId, ValidationError};
use crate::core::stage::{Category, ProcessingStage, StageMetadata};
use crate::filters::registry::StageRegistry;
use std::any::Any;
use std::path::{Path, PathBuf};

/// Register I/O stages.
pub fn register(registry: &mut StageRegistry) {
    registry.register(|| Box::new(FileSource::default()));
}

/// Reads an image through the global codec registry.
///
/// The information pass reads only the header. The data pass reads the file
/// and keeps the requested region.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }
}

impl ProcessingStage for FileSource {
    fn metadata(&self) -> StageMetadata {
        StageMetadata::builder("file_source", "File Source")
            .description("Reads an image file through the registered codecs")
            .category(Category::Source)
            .inputs(0)
            .build()
    }

    fn validate(&self, node_id: NodeId) -> Result<(), ValidationError> {
        if self.path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidParameter {
                node_id,
                parameter: "path".to_string(),
                error: "path cannot be empty".to_string(),
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
        let info = crate::io::read_information(&self.path)?;
        for output in outputs.iter_mut() {
            output.set_pixel_type(info.pixel_type);
            output.set_largest_possible_region(info.region.clone());
            output.set_geometry(info.geometry.clone());
        }
        Ok(())
    }

    fn generate_data(&self, ctx: &mut ExecutionContext<'_>) -> ExecutionResult<()> {
        let image = crate::io::read(&self.path)?;
        ctx.report_progress(0.5);

        let requested = ctx.output(0)?.requested_region().clone();
        if image.largest_possible_region() != ctx.output(0)?.largest_possible_region() {
            return Err(ctx.failure(format!(
                "{} changed size since its header was read",
                self.path.display()
            )));
        }
        let extracted = image
            .extract(&requested)
            .ok_or_else(|| ctx.failure(format!("{} does not cover {}", self.path.display(), requested)))?;
        *ctx.output_mut(0)? = extracted;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata() {
        let metadata = FileSource::default().metadata();
        assert_eq!(metadata.id, "file_source");
        assert_eq!(metadata.category, Category::Source);
        assert_eq!(metadata.inputs, 0);
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(FileSource::default().validate(NodeId::new()).is_err());
        assert!(FileSource::new("volume.mha").validate(NodeId::new()).is_ok());
    }
}
