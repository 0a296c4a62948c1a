//! Stage module.
//!
//! Contains the stage registry and built-in stage implementations.

pub mod builtin;
pub mod registry;

pub use registry::{StageFactory, StageRegistry};
