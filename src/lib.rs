//! # Lazyflow - Demand-driven N-dimensional image pipelines
//!
//! Lazyflow connects processing stages into a directed acyclic pipeline and
//! computes only what a client asks for. A request for a region of one stage
//! output travels upstream, each stage translating it into the input regions
//! it needs, and only stages whose cached data is stale or too small run.
//!
//! ## Features
//!
//! - **Region propagation**: largest possible, buffered and requested regions
//!   on every output, with bounding-union merging across consumers
//! - **Incremental updates**: a pipeline clock stamps every change, so
//!   repeated requests re-run nothing
//! - **Multi-resolution schedules**: per-level shrink factors and the
//!   physical geometry of each level, preserving the image center
//! - **File I/O**: MetaImage volumes and common raster formats through a
//!   process-wide codec registry
//!
//! ## Quick Start
//!
//! ```rust
//! use lazyflow::prelude::*;
//!
//! let mut pipeline = Pipeline::new();
//! let source = pipeline.add_stage(Box::new(SyntheticSource::ramp(&[64, 64])));
//! let scaled = pipeline.add_stage(Box::new(ShiftScale::new(1.0, 0.5)));
//! pipeline.connect(source, 0, scaled, 0).unwrap();
//!
//! let report = ValidationPipeline::default().validate(&pipeline);
//! assert!(report.can_execute());
//!
//! let executor = PipelineExecutor::new();
//! let tile = Region::new(vec![8, 8], vec![16, 16]).unwrap();
//! executor.request_output(&mut pipeline, scaled, 0, &tile).unwrap();
//!
//! let output = pipeline.output(scaled, 0).unwrap();
//! assert!(output.buffered_region().contains(&tile));
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: regions, containers, geometry, the stage trait and errors
//! - [`graph`]: pipeline arena and topology analysis
//! - [`validation`]: pre-update checks
//! - [`execution`]: the update protocol
//! - [`multires`]: schedules and the pyramid stage
//! - [`filters`]: stage registry and built-in stages
//! - [`io`]: image codecs
//! - [`config`] and [`cli`]: the command-line driver

#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod core;
pub mod execution;
pub mod filters;
pub mod graph;
pub mod io;
pub mod multires;
pub mod validation;

/// Prelude module for convenient imports.
///
/// ```rust
/// use lazyflow::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::container::{DataContainer, PixelBuffer, PixelType};
    pub use crate::core::context::ExecutionContext;
    pub use crate::core::geometry::PhysicalGeometry;
    pub use crate::core::region::Region;
    pub use crate::core::stage::{Category, PassthroughStage, ProcessingStage, StageMetadata};

    // Errors
    pub use crate::core::error::{
        ExecutionError, ExecutionResult, GraphError, IoError, LazyflowError, LazyflowResult,
        NodeId, ScheduleError, ValidationError, ValidationReport, ValidationWarning,
    };

    // Graph
    pub use crate::graph::connection::{Connection, Endpoint};
    pub use crate::graph::structure::{Pipeline, StageNode};
    pub use crate::graph::topology::TopologyAnalyzer;

    // Validation
    pub use crate::validation::pipeline::ValidationPipeline;
    pub use crate::validation::stages::ValidationStage;

    // Execution
    pub use crate::execution::engine::{ExecutionOptions, ExecutionStats, PipelineExecutor};
    pub use crate::execution::progress::{ObserverId, ProgressEvent};

    // Multi-resolution
    pub use crate::multires::{LevelGeometry, MultiResolutionPyramid, Schedule, ScheduleComputer};

    // Stages
    pub use crate::filters::builtin::{
        BoxMean, Colormap, ContainerSource, FileSource, ShiftScale, SyntheticSource,
        TextureFeatures,
    };
    pub use crate::filters::registry::StageRegistry;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
