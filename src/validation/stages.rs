//! Individual validation stages.
//!
//! Each stage checks for a specific category of errors.

use crate::core::error::{ValidationError, ValidationWarning};
use crate::graph::structure::Pipeline;
use crate::graph::topology::TopologyAnalyzer;

/// Trait for validation stages.
pub trait ValidationStage: Send + Sync {
    /// Name of this validation stage.
    fn name(&self) -> &str;

    /// Validate the pipeline.
    ///
    /// Returns Ok with warnings, or Err with errors.
    fn validate(&self, pipeline: &Pipeline) -> Result<Vec<ValidationWarning>, Vec<ValidationError>>;
}

fn into_result(
    warnings: Vec<ValidationWarning>,
    errors: Vec<ValidationError>,
) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(errors)
    }
}

/// Structural validation - checks pipeline structure.
///
/// Verifies:
/// - The pipeline is a DAG
/// - Every declared input is connected
pub struct StructuralValidation;

impl ValidationStage for StructuralValidation {
    fn name(&self) -> &str {
        "Structural Validation"
    }

    fn validate(&self, pipeline: &Pipeline) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if pipeline.is_empty() {
            warnings.push(ValidationWarning {
                message: "Pipeline is empty".to_string(),
                node_id: None,
            });
            return Ok(warnings);
        }

        let analyzer = TopologyAnalyzer::new(pipeline);
        if analyzer.has_cycle() {
            errors.push(ValidationError::CycleDetected);
        }

        for node in pipeline.nodes() {
            for index in 0..node.stage.metadata().inputs {
                if !pipeline.is_input_connected(node.id, index) {
                    errors.push(ValidationError::MissingRequiredInput {
                        node_id: node.id,
                        index,
                    });
                }
            }
        }

        let subgraphs = analyzer.find_subgraphs();
        if subgraphs.len() > 1 {
            warnings.push(ValidationWarning {
                message: format!("Pipeline contains {} disconnected parts", subgraphs.len()),
                node_id: None,
            });
        }

        into_result(warnings, errors)
    }
}

/// Parameter validation - runs each stage's own parameter checks.
pub struct ParameterValidation;

impl ValidationStage for ParameterValidation {
    fn name(&self) -> &str {
        "Parameter Validation"
    }

    fn validate(&self, pipeline: &Pipeline) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let errors = pipeline
            .nodes()
            .filter_map(|node| node.stage.validate(node.id).err())
            .collect();
        into_result(Vec::new(), errors)
    }
}

/// Connectivity validation - rejects stages that take no part in the pipeline.
///
/// A lone stage in a single-stage pipeline is fine.
pub struct ConnectivityValidation;

impl ValidationStage for ConnectivityValidation {
    fn name(&self) -> &str {
        "Connectivity Validation"
    }

    fn validate(&self, pipeline: &Pipeline) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        if pipeline.node_count() < 2 {
            return Ok(Vec::new());
        }
        let errors = pipeline
            .nodes()
            .filter(|node| {
                pipeline.connections_from(node.id).next().is_none()
                    && pipeline.connections_to(node.id).next().is_none()
            })
            .map(|node| ValidationError::IsolatedStage(node.id))
            .collect();
        into_result(Vec::new(), errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::builtin::{BoxMean, ShiftScale, SyntheticSource};

    #[test]
    fn test_structural_validation_empty_pipeline() {
        let pipeline = Pipeline::new();
        let warnings = StructuralValidation.validate(&pipeline).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_missing_input_reported() {
        let mut pipeline = Pipeline::new();
        let filter = pipeline.add_stage(Box::new(ShiftScale::default()));

        let errors = StructuralValidation.validate(&pipeline).unwrap_err();
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::MissingRequiredInput { node_id, index: 0 }] if *node_id == filter
        ));
    }

    #[test]
    fn test_disconnected_parts_warned() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(Box::new(SyntheticSource::ramp(&[4])));
        pipeline.add_stage(Box::new(SyntheticSource::ramp(&[4])));

        let warnings = StructuralValidation.validate(&pipeline).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(ConnectivityValidation.validate(&pipeline).unwrap_err().len(), 2);
    }

    #[test]
    fn test_parameter_validation() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add_stage(Box::new(SyntheticSource::ramp(&[4])));
        let mean = pipeline.add_stage(Box::new(BoxMean::new(vec![])));
        pipeline.connect(source, 0, mean, 0).unwrap();

        let errors = ParameterValidation.validate(&pipeline).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].affected_nodes(), vec![mean]);
    }
}
