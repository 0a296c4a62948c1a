//! Shrink-factor schedules for multi-resolution processing.
//!
//! A [`Schedule`] is a rectangular `levels × axes` matrix of integer shrink
//! factors. Level 0 is the coarsest. The [`ScheduleComputer`] builds schedules
//! from a level count or from explicit starting factors, validates schedules
//! assigned directly, and derives the reduced geometry of each level.

use crate::core::error::{ScheduleError, ScheduleResult};
use crate::core::geometry::PhysicalGeometry;
use crate::core::region::Region;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rectangular matrix of shrink factors, one row per level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u32>>", into = "Vec<Vec<u32>>")]
pub struct Schedule {
    levels: Vec<Vec<u32>>,
}

impl Schedule {
    /// Create a schedule from its rows.
    ///
    /// Rejects an empty matrix and rows of differing length. Zero factors are
    /// representable here; [`ScheduleComputer::set_schedule`] raises them to 1.
    pub fn new(levels: Vec<Vec<u32>>) -> ScheduleResult<Self> {
        let first = levels.first().ok_or(ScheduleError::ZeroLevels)?;
        let dimension = first.len();
        if dimension == 0 {
            return Err(ScheduleError::ZeroDimension);
        }
        if let Some((level, row)) = levels
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != dimension)
        {
            return Err(ScheduleError::RaggedLevel {
                level,
                expected: dimension,
                got: row.len(),
            });
        }
        Ok(Self { levels })
    }

    /// A schedule with every factor equal to `factor`.
    pub fn filled(levels: usize, dimension: usize, factor: u32) -> ScheduleResult<Self> {
        Self::new(vec![vec![factor; dimension]; levels])
    }

    /// Halve `starting` per level: level `k` gets `max(1, start >> k)`.
    ///
    /// A zero starting factor is treated as 1.
    pub fn from_starting_factors(levels: usize, starting: &[u32]) -> ScheduleResult<Self> {
        if levels == 0 {
            return Err(ScheduleError::ZeroLevels);
        }
        let starting: Vec<u32> = starting
            .iter()
            .enumerate()
            .map(|(axis, &factor)| {
                if factor == 0 {
                    log::debug!("Starting shrink factor on axis {} is zero; using 1", axis);
                    1
                } else {
                    factor
                }
            })
            .collect();
        let rows = (0..levels)
            .map(|level| {
                starting
                    .iter()
                    .map(|&start| {
                        u32::try_from(level)
                            .ok()
                            .and_then(|shift| start.checked_shr(shift))
                            .unwrap_or(0)
                            .max(1)
                    })
                    .collect()
            })
            .collect();
        Self::new(rows)
    }

    /// Number of levels.
    pub fn number_of_levels(&self) -> usize {
        self.levels.len()
    }

    /// Number of axes.
    pub fn dimension(&self) -> usize {
        self.levels[0].len()
    }

    /// Factors of one level.
    pub fn level(&self, level: usize) -> Option<&[u32]> {
        self.levels.get(level).map(Vec::as_slice)
    }

    /// All rows, coarsest first.
    pub fn rows(&self) -> &[Vec<u32>] {
        &self.levels
    }

    /// Factors of the coarsest level.
    pub fn starting_factors(&self) -> &[u32] {
        &self.levels[0]
    }

    /// Replace every zero factor with 1.
    fn without_zero_factors(mut self) -> Self {
        for (level, row) in self.levels.iter_mut().enumerate() {
            for (axis, factor) in row.iter_mut().enumerate() {
                if *factor == 0 {
                    log::debug!("Shrink factor at level {}, axis {} is zero; using 1", level, axis);
                    *factor = 1;
                }
            }
        }
        self
    }

    /// Whether each level's factor is a multiple of the next level's factor.
    ///
    /// A zero divisor makes the schedule non-divisible.
    pub fn is_downward_divisible(&self) -> bool {
        self.levels.windows(2).all(|pair| {
            pair[0]
                .iter()
                .zip(&pair[1])
                .all(|(&coarse, &fine)| fine != 0 && coarse % fine == 0)
        })
    }
}

impl TryFrom<Vec<Vec<u32>>> for Schedule {
    type Error = ScheduleError;

    fn try_from(levels: Vec<Vec<u32>>) -> ScheduleResult<Self> {
        Self::new(levels)
    }
}

impl From<Schedule> for Vec<Vec<u32>> {
    fn from(schedule: Schedule) -> Self {
        schedule.levels
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (level, row) in self.levels.iter().enumerate() {
            if level > 0 {
                writeln!(f)?;
            }
            write!(f, "{:?}", row)?;
        }
        Ok(())
    }
}

/// Reduced extent and geometry of one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelGeometry {
    /// Shrink factors of the level.
    pub factors: Vec<u32>,
    /// Largest possible region of the level.
    pub region: Region,
    /// Physical geometry of the level.
    pub geometry: PhysicalGeometry,
}

/// Builds and validates schedules for a fixed number of axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleComputer {
    dimension: usize,
    schedule: Schedule,
}

impl ScheduleComputer {
    /// Levels used until the caller asks for another count.
    pub const DEFAULT_LEVELS: usize = 2;

    /// Create a computer with the default two-level schedule.
    pub fn new(dimension: usize) -> ScheduleResult<Self> {
        if dimension == 0 {
            return Err(ScheduleError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            schedule: Self::halving(Self::DEFAULT_LEVELS, dimension)?,
        })
    }

    fn halving(levels: usize, dimension: usize) -> ScheduleResult<Schedule> {
        let shift = u32::try_from(levels.saturating_sub(1)).unwrap_or(u32::MAX);
        let start = 1u32.checked_shl(shift).unwrap_or(1 << 31);
        Schedule::from_starting_factors(levels, &vec![start; dimension])
    }

    /// Number of axes.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of levels.
    pub fn number_of_levels(&self) -> usize {
        self.schedule.number_of_levels()
    }

    /// Current schedule.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Factors of the coarsest level.
    pub fn starting_shrink_factors(&self) -> &[u32] {
        self.schedule.starting_factors()
    }

    /// Whether the current schedule is downward divisible.
    pub fn is_downward_divisible(&self) -> bool {
        self.schedule.is_downward_divisible()
    }

    /// Set the level count; the schedule becomes `2^(L-1)` halved per level.
    ///
    /// Asking for the current count keeps the current schedule.
    pub fn set_number_of_levels(&mut self, levels: usize) -> ScheduleResult<()> {
        if levels == 0 {
            return Err(ScheduleError::ZeroLevels);
        }
        if levels == self.number_of_levels() {
            return Ok(());
        }
        self.schedule = Self::halving(levels, self.dimension)?;
        Ok(())
    }

    /// Seed the schedule with explicit coarsest-level factors.
    pub fn set_starting_shrink_factors(&mut self, factors: &[u32]) -> ScheduleResult<()> {
        if factors.len() != self.dimension {
            return Err(ScheduleError::DimensionMismatch {
                expected: self.dimension,
                got: factors.len(),
            });
        }
        self.schedule = Schedule::from_starting_factors(self.number_of_levels(), factors)?;
        Ok(())
    }

    /// Seed every axis with the same coarsest-level factor.
    pub fn set_uniform_starting_shrink_factor(&mut self, factor: u32) -> ScheduleResult<()> {
        self.set_starting_shrink_factors(&vec![factor; self.dimension])
    }

    /// Assign a schedule as-is.
    ///
    /// Non-divisible schedules are accepted. The level count must match the
    /// declared number of levels. Zero factors become 1.
    pub fn set_schedule(&mut self, schedule: Schedule) -> ScheduleResult<()> {
        if schedule.number_of_levels() != self.number_of_levels() {
            return Err(ScheduleError::LevelCountMismatch {
                expected: self.number_of_levels(),
                got: schedule.number_of_levels(),
            });
        }
        if schedule.dimension() != self.dimension {
            return Err(ScheduleError::DimensionMismatch {
                expected: self.dimension,
                got: schedule.dimension(),
            });
        }
        let schedule = schedule.without_zero_factors();
        if !schedule.is_downward_divisible() {
            log::debug!("Accepting schedule that is not downward divisible:\n{}", schedule);
        }
        self.schedule = schedule;
        Ok(())
    }

    /// Extent and geometry of `level` for an input with the given extent and
    /// geometry.
    ///
    /// Spacing grows by the factor, size shrinks to `max(1, size / f)`, the
    /// start index becomes `ceil(start / f)`, and the origin moves so that the
    /// physical centers of the input and output regions coincide.
    pub fn level_geometry(
        &self,
        level: usize,
        input_region: &Region,
        input_geometry: &PhysicalGeometry,
    ) -> ScheduleResult<LevelGeometry> {
        let factors = self
            .schedule
            .level(level)
            .ok_or(ScheduleError::LevelOutOfRange {
                level,
                levels: self.number_of_levels(),
            })?
            .to_vec();
        for got in [input_region.dimension(), input_geometry.dimension()] {
            if got != self.dimension {
                return Err(ScheduleError::DimensionMismatch {
                    expected: self.dimension,
                    got,
                });
            }
        }

        let index = input_region
            .index()
            .iter()
            .zip(&factors)
            .map(|(&start, &f)| ceil_div(start, f))
            .collect();
        let size = input_region
            .size()
            .iter()
            .zip(&factors)
            .map(|(&s, &f)| (s / f as usize).max(1))
            .collect();
        let region = Region::new(index, size).map_err(|_| ScheduleError::DimensionMismatch {
            expected: self.dimension,
            got: input_region.dimension(),
        })?;

        let center_point = input_geometry.region_center(input_region);
        let center_index = PhysicalGeometry::region_center_index(&region);
        let scale: Vec<f64> = factors.iter().map(|&f| f as f64).collect();
        let geometry = input_geometry.resampled(&scale, &center_index, &center_point);

        Ok(LevelGeometry {
            factors,
            region,
            geometry,
        })
    }
}

/// `ceil(a / b)` for positive `b`.
fn ceil_div(a: i64, b: u32) -> i64 {
    let b = i64::from(b.max(1));
    (a + b - 1).div_euclid(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_two_levels() {
        let computer = ScheduleComputer::new(2).unwrap();
        assert_eq!(computer.schedule().rows(), &[vec![2, 2], vec![1, 1]]);
    }

    #[test]
    fn test_level_count_schedule() {
        let mut computer = ScheduleComputer::new(3).unwrap();
        computer.set_number_of_levels(3).unwrap();
        assert_eq!(
            computer.schedule().rows(),
            &[vec![4, 4, 4], vec![2, 2, 2], vec![1, 1, 1]]
        );
        assert_eq!(computer.set_number_of_levels(0), Err(ScheduleError::ZeroLevels));
    }

    #[test]
    fn test_unchanged_level_count_keeps_schedule() {
        let mut computer = ScheduleComputer::new(2).unwrap();
        computer.set_starting_shrink_factors(&[6, 3]).unwrap();
        let before = computer.schedule().clone();
        computer.set_number_of_levels(2).unwrap();
        assert_eq!(computer.schedule(), &before);
    }

    #[test]
    fn test_starting_factors() {
        let mut computer = ScheduleComputer::new(3).unwrap();
        computer.set_number_of_levels(4).unwrap();
        computer.set_starting_shrink_factors(&[8, 4, 2]).unwrap();
        assert_eq!(
            computer.schedule().rows(),
            &[vec![8, 4, 2], vec![4, 2, 1], vec![2, 1, 1], vec![1, 1, 1]]
        );
        assert_eq!(computer.starting_shrink_factors(), &[8, 4, 2]);
        assert_eq!(
            computer.set_starting_shrink_factors(&[2, 2]),
            Err(ScheduleError::DimensionMismatch { expected: 3, got: 2 })
        );
    }

    #[test]
    fn test_zero_starting_factor_becomes_one() {
        let mut computer = ScheduleComputer::new(2).unwrap();
        computer.set_number_of_levels(3).unwrap();
        computer.set_starting_shrink_factors(&[0, 4]).unwrap();
        assert_eq!(
            computer.schedule().rows(),
            &[vec![1, 4], vec![1, 2], vec![1, 1]]
        );
    }

    #[test]
    fn test_divisibility() {
        assert!(Schedule::filled(3, 2, 1).unwrap().is_downward_divisible());
        let odd = Schedule::new(vec![vec![4, 4], vec![3, 3]]).unwrap();
        assert!(!odd.is_downward_divisible());
        let zero = Schedule::new(vec![vec![4, 4], vec![0, 1]]).unwrap();
        assert!(!zero.is_downward_divisible());
    }

    #[test]
    fn test_set_schedule_validation() {
        let mut computer = ScheduleComputer::new(2).unwrap();
        computer.set_number_of_levels(2).unwrap();

        let odd = Schedule::new(vec![vec![4, 4], vec![3, 3]]).unwrap();
        computer.set_schedule(odd.clone()).unwrap();
        assert_eq!(computer.schedule(), &odd);
        assert!(!computer.is_downward_divisible());

        let short = Schedule::new(vec![vec![1, 1]]).unwrap();
        assert_eq!(
            computer.set_schedule(short),
            Err(ScheduleError::LevelCountMismatch { expected: 2, got: 1 })
        );
        let wide = Schedule::filled(2, 3, 1).unwrap();
        assert!(matches!(
            computer.set_schedule(wide),
            Err(ScheduleError::DimensionMismatch { .. })
        ));
        assert_eq!(computer.schedule(), &odd);

        computer.set_schedule(Schedule::filled(2, 2, 0).unwrap()).unwrap();
        assert_eq!(computer.schedule().rows(), &[vec![1, 1], vec![1, 1]]);

        let partial = Schedule::new(vec![vec![0, 4], vec![3, 0]]).unwrap();
        computer.set_schedule(partial).unwrap();
        assert_eq!(computer.schedule().rows(), &[vec![1, 4], vec![3, 1]]);
        assert!(!computer.is_downward_divisible());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert_eq!(
            Schedule::new(vec![vec![2, 2], vec![1]]),
            Err(ScheduleError::RaggedLevel {
                level: 1,
                expected: 2,
                got: 1
            })
        );
        assert_eq!(Schedule::new(Vec::new()), Err(ScheduleError::ZeroLevels));
    }

    #[test]
    fn test_level_geometry_rounding() {
        let computer = ScheduleComputer::new(2).unwrap();
        let region = Region::new(vec![3, -3], vec![7, 1]).unwrap();
        let level = computer
            .level_geometry(0, &region, &PhysicalGeometry::identity(2))
            .unwrap();
        assert_eq!(level.factors, vec![2, 2]);
        assert_eq!(level.region.index(), &[2, -1]);
        assert_eq!(level.region.size(), &[3, 1]);
        assert_eq!(level.geometry.spacing(), &[2.0, 2.0]);

        assert!(matches!(
            computer.level_geometry(2, &region, &PhysicalGeometry::identity(2)),
            Err(ScheduleError::LevelOutOfRange { level: 2, levels: 2 })
        ));
    }

    #[test]
    fn test_schedule_serde() {
        let schedule = Schedule::new(vec![vec![4, 2], vec![2, 1]]).unwrap();
        let json = serde_json::to_string(&schedule).unwrap();
        assert_eq!(json, "[[4,2],[2,1]]");
        let back: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schedule);
        assert!(serde_json::from_str::<Schedule>("[[1,1],[1]]").is_err());
    }
}
