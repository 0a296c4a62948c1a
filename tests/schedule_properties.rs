//! Property tests for schedules and level geometry.

use lazyflow::prelude::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn level_count_schedules_are_divisible(levels in 1usize..10, dimension in 1usize..5) {
        let mut computer = ScheduleComputer::new(dimension).unwrap();
        computer.set_number_of_levels(levels).unwrap();

        let schedule = computer.schedule();
        prop_assert_eq!(schedule.number_of_levels(), levels);
        prop_assert!(schedule.is_downward_divisible());
        prop_assert!(schedule.starting_factors().iter().all(|&f| f == 1 << (levels - 1)));
        prop_assert!(schedule.level(levels - 1).unwrap().iter().all(|&f| f == 1));
    }

    #[test]
    fn starting_factors_halve_per_level(
        levels in 1usize..8,
        starting in prop::collection::vec(0u32..100, 1..5),
    ) {
        let mut computer = ScheduleComputer::new(starting.len()).unwrap();
        computer.set_number_of_levels(levels).unwrap();
        computer.set_starting_shrink_factors(&starting).unwrap();

        for level in 0..levels {
            let row = computer.schedule().level(level).unwrap();
            for (axis, &start) in starting.iter().enumerate() {
                let expected = (start.max(1) >> level).max(1);
                prop_assert_eq!(row[axis], expected);
            }
        }
    }

    #[test]
    fn level_geometry_preserves_center(
        size in prop::collection::vec(1usize..200, 1..4),
        factor in 1u32..9,
        spacing in 0.1f64..5.0,
        start in -20i64..20,
    ) {
        let dimension = size.len();
        let region = Region::new(vec![start; dimension], size.clone()).unwrap();
        let geometry = PhysicalGeometry::identity(dimension)
            .with_spacing(vec![spacing; dimension])
            .unwrap();
        let mut computer = ScheduleComputer::new(dimension).unwrap();
        computer.set_uniform_starting_shrink_factor(factor).unwrap();

        let reduced = computer.level_geometry(0, &region, &geometry).unwrap();
        let before = geometry.region_center(&region);
        let after = reduced.geometry.region_center(&reduced.region);
        for axis in 0..dimension {
            let expected_size = (size[axis] / factor as usize).max(1);
            prop_assert_eq!(reduced.region.size()[axis], expected_size);
            let output_spacing = reduced.geometry.spacing()[axis];
            prop_assert!((output_spacing - spacing * factor as f64).abs() < 1e-9);
            prop_assert!((before[axis] - after[axis]).abs() / output_spacing <= 1e-3);
        }
    }

    #[test]
    fn any_positive_schedule_with_matching_levels_is_accepted(
        rows in prop::collection::vec(prop::collection::vec(1u32..16, 3), 1..6),
    ) {
        let schedule = Schedule::new(rows.clone()).unwrap();
        let divisible = schedule.is_downward_divisible();

        let mut computer = ScheduleComputer::new(3).unwrap();
        computer.set_number_of_levels(rows.len()).unwrap();
        prop_assert!(computer.set_schedule(schedule).is_ok());
        prop_assert_eq!(computer.schedule().rows(), rows.as_slice());
        prop_assert_eq!(computer.is_downward_divisible(), divisible);

        let mut other = ScheduleComputer::new(3).unwrap();
        other.set_number_of_levels(rows.len() + 1).unwrap();
        let mismatched = Schedule::new(rows).unwrap();
        prop_assert!(other.set_schedule(mismatched).is_err());
    }
}
