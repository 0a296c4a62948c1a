//! Core types and traits for the Lazyflow pipeline.
//!
//! This module contains the foundational types of the update protocol:
//! - Regions in index space and physical geometry
//! - Data containers with their region bookkeeping
//! - The processing stage trait and its execution context
//! - Error types

pub mod container;
pub mod context;
pub mod error;
pub mod geometry;
pub mod region;
pub mod stage;

// Re-export commonly used types
pub use container::{DataContainer, PixelBuffer, PixelType};
pub use context::ExecutionContext;
pub use error::{ExecutionError, GraphError, LazyflowError, NodeId, ScheduleError};
pub use geometry::PhysicalGeometry;
pub use region::Region;
pub use stage::{Category, ProcessingStage, StageMetadata};
