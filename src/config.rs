//! Driver configuration loaded from TOML.
//!
//! ```toml
//! log_level = "debug"
//!
//! [execution]
//! max_threads = 4
//! verify_invariants = true
//!
//! [pyramid]
//! levels = 3
//! starting_factors = [8, 4, 2]
//! ```

use crate::core::error::{ConfigError, ScheduleResult};
use crate::execution::ExecutionOptions;
use crate::multires::{Schedule, ScheduleComputer};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration of the command-line driver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Options handed to the pipeline executor.
    pub execution: ExecutionOptions,
    /// Schedule used by the `pyramid` and `schedule` commands.
    pub pyramid: PyramidConfig,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

impl DriverConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// How to build the multi-resolution schedule.
///
/// Applied in order: level count, then starting factors, then an explicit
/// schedule. Later entries override what earlier ones produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidConfig {
    pub levels: usize,
    pub starting_factors: Option<Vec<u32>>,
    pub schedule: Option<Schedule>,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            levels: ScheduleComputer::DEFAULT_LEVELS,
            starting_factors: None,
            schedule: None,
        }
    }
}

impl PyramidConfig {
    /// Build a schedule computer for `dimension` axes.
    pub fn schedule_computer(&self, dimension: usize) -> ScheduleResult<ScheduleComputer> {
        let mut computer = ScheduleComputer::new(dimension)?;
        computer.set_number_of_levels(self.levels)?;
        if let Some(factors) = &self.starting_factors {
            computer.set_starting_shrink_factors(factors)?;
        }
        if let Some(schedule) = &self.schedule {
            computer.set_schedule(schedule.clone())?;
        }
        Ok(computer)
    }
}
