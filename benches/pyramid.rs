//! Pyramid construction and tiled requests.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lazyflow::prelude::*;

fn pyramid_pipeline(size: &[usize], levels: usize) -> (Pipeline, NodeId) {
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_stage(Box::new(SyntheticSource::ramp(size)));
    let pyramid = pipeline.add_stage(Box::new(
        MultiResolutionPyramid::with_levels(size.len(), levels).unwrap(),
    ));
    pipeline.connect(source, 0, pyramid, 0).unwrap();
    (pipeline, pyramid)
}

fn bench_pyramid(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid");
    group.sample_size(20);

    for (name, size) in [("256x256", vec![256, 256]), ("64x64x32", vec![64, 64, 32])] {
        group.bench_with_input(BenchmarkId::new("three_levels", name), &size, |b, size| {
            let executor = PipelineExecutor::new();
            b.iter(|| {
                let (mut pipeline, pyramid) = pyramid_pipeline(size, 3);
                let stats = executor
                    .update_largest_possible_region(&mut pipeline, pyramid, 2)
                    .unwrap();
                black_box(stats.stages_executed)
            })
        });
    }
    group.finish();
}

fn bench_schedule(c: &mut Criterion) {
    let region = Region::from_size(&[128, 132, 48]);
    let geometry = PhysicalGeometry::identity(3)
        .with_spacing(vec![0.5, 2.7, 7.5])
        .unwrap();
    let mut computer = ScheduleComputer::new(3).unwrap();
    computer.set_number_of_levels(4).unwrap();

    c.bench_function("level_geometry", |b| {
        b.iter(|| {
            for level in 0..computer.number_of_levels() {
                black_box(computer.level_geometry(level, &region, &geometry).unwrap());
            }
        })
    });
}

fn bench_tiled_requests(c: &mut Criterion) {
    c.bench_function("box_mean_tiles", |b| {
        let executor = PipelineExecutor::new();
        b.iter(|| {
            let mut pipeline = Pipeline::new();
            let source = pipeline.add_stage(Box::new(SyntheticSource::ramp(&[256, 256])));
            let mean = pipeline.add_stage(Box::new(BoxMean::uniform(2)));
            pipeline.connect(source, 0, mean, 0).unwrap();
            for y in 0..4 {
                for x in 0..4 {
                    let tile = Region::new(vec![x * 64, y * 64], vec![64, 64]).unwrap();
                    executor.request_output(&mut pipeline, mean, 0, &tile).unwrap();
                }
            }
            black_box(pipeline.execution_count(mean).unwrap())
        })
    });
}

criterion_group!(benches, bench_pyramid, bench_schedule, bench_tiled_requests);
criterion_main!(benches);
