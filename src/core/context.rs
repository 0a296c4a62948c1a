//! Execution context handed to a stage's data-generation step.
//!
//! The context gives read-only access to every input container and mutable
//! access to the stage's own outputs. Outputs are already allocated over their
//! requested regions when the stage runs.

use crate::core::container::{DataContainer, PixelType};
use crate::core::error::{ExecutionError, ExecutionResult, NodeId};

/// Callback receiving a progress fraction in `[0, 1]`.
pub type ProgressSink<'a> = &'a (dyn Fn(f32) + Sync);

/// Context provided during stage execution.
pub struct ExecutionContext<'a> {
    /// ID of the stage being executed.
    pub node_id: NodeId,
    inputs: Vec<&'a DataContainer>,
    outputs: &'a mut [DataContainer],
    progress: ProgressSink<'a>,
}

impl<'a> ExecutionContext<'a> {
    /// Create a new execution context.
    pub fn new(
        node_id: NodeId,
        inputs: Vec<&'a DataContainer>,
        outputs: &'a mut [DataContainer],
        progress: ProgressSink<'a>,
    ) -> Self {
        Self {
            node_id,
            inputs,
            outputs,
            progress,
        }
    }

    /// Number of connected inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs.
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Get an input container.
    pub fn input(&self, index: usize) -> ExecutionResult<&'a DataContainer> {
        self.inputs.get(index).copied().ok_or_else(|| {
            ExecutionError::StageFailed {
                node_id: self.node_id,
                error: format!("input {} is not available", index),
            }
        })
    }

    /// Get an input that must hold scalar pixels.
    pub fn scalar_input(&self, index: usize) -> ExecutionResult<&'a DataContainer> {
        let input = self.input(index)?;
        if input.pixel_type() != PixelType::Scalar {
            return Err(ExecutionError::PixelTypeMismatch {
                node_id: self.node_id,
                port: index,
                expected: PixelType::Scalar.to_string(),
            });
        }
        Ok(input)
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Get an output container.
    pub fn output(&self, index: usize) -> ExecutionResult<&DataContainer> {
        let node_id = self.node_id;
        self.outputs
            .get(index)
            .ok_or_else(|| ExecutionError::StageFailed {
                node_id,
                error: format!("output {} does not exist", index),
            })
    }

    /// Get a mutable output container.
    pub fn output_mut(&mut self, index: usize) -> ExecutionResult<&mut DataContainer> {
        let node_id = self.node_id;
        self.outputs
            .get_mut(index)
            .ok_or_else(|| ExecutionError::StageFailed {
                node_id,
                error: format!("output {} does not exist", index),
            })
    }

    /// All outputs at once.
    pub fn outputs_mut(&mut self) -> &mut [DataContainer] {
        &mut *self.outputs
    }

    /// Mutable scalar samples of an output, covering its requested region.
    pub fn scalar_output_mut(&mut self, index: usize) -> ExecutionResult<&mut [f32]> {
        let node_id = self.node_id;
        self.output_mut(index)?
            .scalars_mut()
            .ok_or(ExecutionError::PixelTypeMismatch {
                node_id,
                port: index,
                expected: PixelType::Scalar.to_string(),
            })
    }

    // ========================================================================
    // Progress
    // ========================================================================

    /// Report progress as a fraction in `[0, 1]`.
    pub fn report_progress(&self, fraction: f32) {
        (self.progress)(fraction.clamp(0.0, 1.0));
    }

    /// Build a stage failure for this context.
    pub fn failure(&self, error: impl Into<String>) -> ExecutionError {
        ExecutionError::StageFailed {
            node_id: self.node_id,
            error: error.into(),
        }
    }
}
