//! Execution module.
//!
//! This module runs the update protocol over a pipeline.

pub mod engine;
pub mod progress;

pub use engine::{ExecutionOptions, ExecutionStats, PipelineExecutor};
pub use progress::{ObserverId, ObserverList, ProgressCallback, ProgressEvent};
