//! Multi-resolution scheduling.
//!
//! - [`ScheduleComputer`]: shrink-factor schedules and per-level geometry
//! - [`MultiResolutionPyramid`]: a stage producing one output per level

pub mod pyramid;
pub mod schedule;

pub use pyramid::MultiResolutionPyramid;
pub use schedule::{LevelGeometry, Schedule, ScheduleComputer};
