//! Command-line test driver support.
//!
//! [`process_arguments_and_register_required_factories`] prepares a process
//! for running pipelines from the command line: it registers the built-in
//! codecs and strips the driver options from the argument list, leaving the
//! command and its operands for the caller.
//!
//! Driver options:
//!
//! - `--with-threads N`: worker threads for per-pixel work
//! - `--log-level LEVEL`: log filter when `RUST_LOG` is unset
//! - `--config FILE`: TOML driver configuration
//! - `--compare BASELINE TEST`: compare two images after the command ran

use crate::config::DriverConfig;
use crate::core::container::{DataContainer, PixelBuffer};
use crate::core::error::{LazyflowError, LazyflowResult};
use crate::io;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Driver options found on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverOptions {
    pub threads: Option<usize>,
    pub log_level: Option<String>,
    pub config: Option<PathBuf>,
    pub compare: Option<(PathBuf, PathBuf)>,
}

impl DriverOptions {
    /// Load the configuration file, if any, and apply the command-line
    /// overrides on top of it.
    pub fn resolve_config(&self) -> LazyflowResult<DriverConfig> {
        let mut config = match &self.config {
            Some(path) => DriverConfig::load(path)?,
            None => DriverConfig::default(),
        };
        if let Some(threads) = self.threads {
            config.execution.max_threads = threads;
        }
        if let Some(level) = &self.log_level {
            config.log_level = Some(level.clone());
        }
        Ok(config)
    }
}

fn missing_value(option: &str) -> LazyflowError {
    LazyflowError::Other(format!("{} expects a value", option))
}

/// Register the built-in codecs, then remove driver options from `args`.
///
/// `args[0]` is the program name and is left in place, as is everything that
/// is not a driver option.
pub fn process_arguments_and_register_required_factories(
    args: &mut Vec<String>,
) -> LazyflowResult<DriverOptions> {
    io::register_builtin_codecs();
    process_arguments(args)
}

/// Remove driver options from `args` and return them.
pub fn process_arguments(args: &mut Vec<String>) -> LazyflowResult<DriverOptions> {
    let mut options = DriverOptions::default();
    let mut remaining = Vec::with_capacity(args.len());
    let mut iter = std::mem::take(args).into_iter();

    if let Some(program) = iter.next() {
        remaining.push(program);
    }
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--with-threads" => {
                let value = iter.next().ok_or_else(|| missing_value(&arg))?;
                let threads = value.parse().map_err(|_| {
                    LazyflowError::Other(format!("--with-threads expects a number, got '{}'", value))
                })?;
                options.threads = Some(threads);
            }
            "--log-level" => {
                options.log_level = Some(iter.next().ok_or_else(|| missing_value(&arg))?);
            }
            "--config" => {
                options.config = Some(PathBuf::from(iter.next().ok_or_else(|| missing_value(&arg))?));
            }
            "--compare" => {
                let baseline = iter.next().ok_or_else(|| missing_value(&arg))?;
                let test = iter.next().ok_or_else(|| missing_value(&arg))?;
                options.compare = Some((PathBuf::from(baseline), PathBuf::from(test)));
            }
            _ => remaining.push(arg),
        }
    }

    *args = remaining;
    Ok(options)
}

/// Result of comparing two images pixel by pixel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDifference {
    /// Pixels compared.
    pub pixels: usize,
    /// Pixels differing by more than the tolerance.
    pub differing: usize,
    /// Largest absolute difference over all channels.
    pub max_difference: f64,
}

impl ImageDifference {
    pub fn is_match(&self) -> bool {
        self.differing == 0
    }
}

/// Compare the buffered pixels of two containers.
///
/// The containers must have the same buffered extent and pixel type.
pub fn compare_containers(
    baseline: &DataContainer,
    test: &DataContainer,
    tolerance: f64,
) -> LazyflowResult<ImageDifference> {
    if baseline.buffered_region().size() != test.buffered_region().size() {
        return Err(LazyflowError::Other(format!(
            "baseline extent {} differs from test extent {}",
            baseline.buffered_region(),
            test.buffered_region()
        )));
    }
    let differences: Vec<f64> = match (baseline.buffer(), test.buffer()) {
        (PixelBuffer::Scalar(a), PixelBuffer::Scalar(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| (*x as f64 - *y as f64).abs())
            .collect(),
        (PixelBuffer::Rgb(a), PixelBuffer::Rgb(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| {
                x.iter()
                    .zip(y)
                    .map(|(p, q)| (*p as f64 - *q as f64).abs())
                    .fold(0.0, f64::max)
            })
            .collect(),
        _ => {
            return Err(LazyflowError::Other(format!(
                "baseline is {} but test is {}",
                baseline.pixel_type(),
                test.pixel_type()
            )))
        }
    };

    Ok(ImageDifference {
        pixels: differences.len(),
        differing: differences.iter().filter(|d| **d > tolerance).count(),
        max_difference: differences.iter().copied().fold(0.0, f64::max),
    })
}

/// Read two images through the codec registry and compare them.
pub fn compare_images(
    baseline: impl AsRef<Path>,
    test: impl AsRef<Path>,
    tolerance: f64,
) -> LazyflowResult<ImageDifference> {
    let baseline = io::read(baseline)?;
    let test = io::read(test)?;
    compare_containers(&baseline, &test, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::PhysicalGeometry;
    use crate::core::region::Region;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_driver_options_are_stripped() {
        let mut argv = args(&[
            "lazyflow",
            "--with-threads",
            "3",
            "pyramid",
            "--log-level",
            "debug",
            "in.mha",
            "--compare",
            "a.mha",
            "b.mha",
            "out.mha",
        ]);
        let options = process_arguments(&mut argv).unwrap();

        assert_eq!(argv, args(&["lazyflow", "pyramid", "in.mha", "out.mha"]));
        assert_eq!(options.threads, Some(3));
        assert_eq!(options.log_level.as_deref(), Some("debug"));
        assert_eq!(
            options.compare,
            Some((PathBuf::from("a.mha"), PathBuf::from("b.mha")))
        );
    }

    #[test]
    fn test_missing_values_rejected() {
        assert!(process_arguments(&mut args(&["lazyflow", "--config"])).is_err());
        assert!(process_arguments(&mut args(&["lazyflow", "--compare", "a"])).is_err());
        assert!(process_arguments(&mut args(&["lazyflow", "--with-threads", "many"])).is_err());
    }

    #[test]
    fn test_overrides_applied_to_config() {
        let options = DriverOptions {
            threads: Some(2),
            log_level: Some("trace".to_string()),
            ..Default::default()
        };
        let config = options.resolve_config().unwrap();
        assert_eq!(config.execution.max_threads, 2);
        assert_eq!(config.log_level.as_deref(), Some("trace"));
    }

    #[test]
    fn test_compare_containers() {
        let make = |data: Vec<f32>| {
            DataContainer::from_scalars(Region::from_size(&[3]), PhysicalGeometry::identity(1), data)
                .unwrap()
        };
        let difference = compare_containers(&make(vec![1.0, 2.0, 3.0]), &make(vec![1.0, 2.5, 5.0]), 0.5).unwrap();
        assert_eq!(difference.pixels, 3);
        assert_eq!(difference.differing, 1);
        assert_eq!(difference.max_difference, 2.0);
        assert!(!difference.is_match());

        let other = DataContainer::from_scalars(Region::from_size(&[2]), PhysicalGeometry::identity(1), vec![0.0; 2])
            .unwrap();
        assert!(compare_containers(&make(vec![0.0; 3]), &other, 0.0).is_err());
    }
}
