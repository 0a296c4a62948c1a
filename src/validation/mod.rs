//! Validation module for pre-update checking.
//!
//! Validation runs before an update is requested to catch structural and
//! parameter errors early.

pub mod pipeline;
pub mod stages;

pub use pipeline::ValidationPipeline;
pub use stages::{ConnectivityValidation, ParameterValidation, StructuralValidation, ValidationStage};
