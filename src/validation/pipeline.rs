//! Validation pipeline implementation.

use crate::core::error::ValidationReport;
use crate::graph::structure::Pipeline;
use crate::validation::stages::{
    ConnectivityValidation, ParameterValidation, StructuralValidation, ValidationStage,
};
use std::time::Instant;

/// Multi-stage validation pipeline.
///
/// Runs a series of checks on a pipeline before any update is requested.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
}

impl ValidationPipeline {
    /// Create a new validation pipeline with the given stages.
    pub fn new(stages: Vec<Box<dyn ValidationStage>>) -> Self {
        Self { stages }
    }

    /// Structural and parameter checks.
    pub fn default_pipeline() -> Self {
        Self::new(vec![Box::new(StructuralValidation), Box::new(ParameterValidation)])
    }

    /// Default checks plus rejection of isolated stages.
    pub fn strict_pipeline() -> Self {
        let mut pipeline = Self::default_pipeline();
        pipeline.add_stage(Box::new(ConnectivityValidation));
        pipeline
    }

    /// Add a custom validation stage.
    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage>) {
        self.stages.push(stage);
    }

    /// Validate a pipeline through all stages.
    ///
    /// Stops early after a fatal error.
    pub fn validate(&self, pipeline: &Pipeline) -> ValidationReport {
        let start = Instant::now();
        let mut report = ValidationReport::new();

        for stage in &self.stages {
            match stage.validate(pipeline) {
                Ok(warnings) => {
                    for warning in warnings {
                        report.add_warning(warning);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let is_fatal = error.is_fatal();
                        report.add_error(error);
                        if is_fatal {
                            log::debug!("{} stopped validation early", stage.name());
                            report.duration_ms = start.elapsed().as_millis() as u64;
                            return report;
                        }
                    }
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Quick check whether the pipeline can be updated.
    pub fn can_execute(&self, pipeline: &Pipeline) -> bool {
        self.validate(pipeline).can_execute()
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::builtin::{ShiftScale, SyntheticSource};

    #[test]
    fn test_empty_pipeline_is_valid_with_warning() {
        let report = ValidationPipeline::default_pipeline().validate(&Pipeline::new());
        assert!(report.can_execute());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_valid_chain() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add_stage(Box::new(SyntheticSource::ramp(&[4, 4])));
        let filter = pipeline.add_stage(Box::new(ShiftScale::new(1.0, 2.0)));
        pipeline.connect(source, 0, filter, 0).unwrap();

        let report = ValidationPipeline::strict_pipeline().validate(&pipeline);
        assert!(report.can_execute(), "{}", report.summary());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_errors_collected_across_stages() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(Box::new(ShiftScale::new(f32::INFINITY, 1.0)));

        let report = ValidationPipeline::default_pipeline().validate(&pipeline);
        assert!(!report.can_execute());
        assert_eq!(report.errors.len(), 2);
    }
}
