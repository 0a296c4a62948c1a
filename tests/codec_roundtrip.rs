//! Reading and writing images through the codec registry.

use lazyflow::cli;
use lazyflow::core::error::IoError;
use lazyflow::filters::builtin::colormap_by_name;
use lazyflow::io;
use lazyflow::prelude::*;
use tempfile::tempdir;

fn oblique_geometry() -> PhysicalGeometry {
    PhysicalGeometry::new(
        vec![10.0, -4.5, 2.25],
        vec![0.5, 2.7, 7.5],
        vec![
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, -1.0],
            vec![1.0, 0.0, 0.0],
        ],
    )
    .unwrap()
}

fn volume() -> DataContainer {
    let region = Region::from_size(&[5, 4, 3]);
    let data = region
        .indices()
        .map(|i| (i[0] * 100 + i[1] * 10 + i[2]) as f32 - 0.5)
        .collect();
    DataContainer::from_scalars(region, oblique_geometry(), data).unwrap()
}

fn assert_close(a: &[f64], b: &[f64]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < 1e-9, "{:?} vs {:?}", a, b);
    }
}

#[test]
fn test_metaimage_volume_round_trip() {
    io::register_builtin_codecs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("volume.mha");
    let original = volume();

    io::write(&path, &original).unwrap();
    let info = io::read_information(&path).unwrap();
    assert_eq!(info.region, *original.largest_possible_region());
    assert_eq!(info.pixel_type, PixelType::Scalar);
    assert_eq!(info.geometry.direction(), original.geometry().direction());

    let back = io::read(&path).unwrap();
    assert_close(back.geometry().origin(), original.geometry().origin());
    assert_close(back.geometry().spacing(), original.geometry().spacing());
    assert_eq!(back.scalars(), original.scalars());
    assert!(cli::compare_images(&path, &path, 0.0).unwrap().is_match());
}

#[test]
fn test_detached_header_writes_raw_file() {
    io::register_builtin_codecs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("volume.mhd");

    io::write(&path, &volume()).unwrap();
    assert!(dir.path().join("volume.raw").exists());
    let back = io::read(&path).unwrap();
    assert_eq!(back.scalars(), volume().scalars());
}

#[test]
fn test_sub_region_keeps_physical_position() {
    io::register_builtin_codecs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("tile.mha");
    let original = volume();
    let tile = Region::new(vec![2, 1, 1], vec![2, 2, 2]).unwrap();

    io::write(&path, &original.extract(&tile).unwrap()).unwrap();
    let back = io::read(&path).unwrap();
    assert_eq!(back.largest_possible_region().size(), tile.size());
    assert_close(
        &back.geometry().index_to_point(&[0, 0, 0]),
        &original.geometry().index_to_point(tile.index()),
    );
    assert_eq!(back.scalar(&[1, 1, 1]), original.scalar(&[3, 2, 2]));
}

#[test]
fn test_colormapped_png_round_trip() {
    io::register_builtin_codecs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("hot.png");

    let mut pipeline = Pipeline::new();
    let source = pipeline.add_stage(Box::new(SyntheticSource::ramp(&[8, 4])));
    let hot = colormap_by_name("hot").unwrap();
    let colors = pipeline.add_stage(Box::new(Colormap::new(hot, 0.0, 31.0)));
    pipeline.connect(source, 0, colors, 0).unwrap();
    PipelineExecutor::new()
        .update_largest_possible_region(&mut pipeline, colors, 0)
        .unwrap();

    let rendered = pipeline.output(colors, 0).unwrap();
    io::write(&path, rendered).unwrap();
    let back = io::read(&path).unwrap();
    assert_eq!(back.pixel_type(), PixelType::Rgb);
    assert_eq!(back.rgb_pixels(), rendered.rgb_pixels());
    assert_eq!(back.rgb(&[0, 0]), Some([0, 0, 0]));
}

#[test]
fn test_file_source_feeds_a_pipeline() {
    io::register_builtin_codecs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("input.mha");
    io::write(&path, &volume()).unwrap();

    let mut pipeline = Pipeline::new();
    let reader = pipeline.add_stage(Box::new(FileSource::new(&path)));
    let pyramid = pipeline.add_stage(Box::new(MultiResolutionPyramid::new(3).unwrap()));
    pipeline.connect(reader, 0, pyramid, 0).unwrap();

    PipelineExecutor::new()
        .update_largest_possible_region(&mut pipeline, pyramid, 0)
        .unwrap();
    let coarse = pipeline.output(pyramid, 0).unwrap();
    assert_eq!(coarse.largest_possible_region().size(), &[2, 2, 1]);
    assert_close(coarse.geometry().spacing(), &[1.0, 5.4, 15.0]);

    let written = dir.path().join("coarse.mha");
    io::write(&written, coarse).unwrap();
    assert_eq!(io::read(&written).unwrap().scalars(), coarse.scalars());
}

#[test]
fn test_unknown_format_has_no_codec() {
    io::register_builtin_codecs();
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.xyz");
    std::fs::write(&path, b"nothing to see").unwrap();

    assert!(matches!(io::read(&path), Err(IoError::NoCodec { .. })));
    assert!(matches!(io::write(&path, &volume()), Err(IoError::NoCodec { .. })));
}
