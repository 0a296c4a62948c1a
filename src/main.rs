//! Lazyflow CLI - demand-driven image pipelines
//!
//! A small driver around the Lazyflow library: inspect files, print
//! multi-resolution schedules and write pyramids.

use anyhow::{bail, Context};
use lazyflow::cli::{self, DriverOptions};
use lazyflow::config::DriverConfig;
use lazyflow::io;
use lazyflow::prelude::*;
use std::path::{Path, PathBuf};

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().collect();
    let options = cli::process_arguments_and_register_required_factories(&mut args)?;
    let config = options.resolve_config()?;
    init_logging(&config);
    log::info!("Driver configuration: {:?}", config);

    println!("🧭 Lazyflow - Demand-driven image pipelines v{}", lazyflow::VERSION);
    println!();

    let program = args.first().cloned().unwrap_or_else(|| lazyflow::NAME.to_string());
    if args.len() < 2 {
        if options.compare.is_none() {
            print_usage(&program);
        }
        return run_comparison(&options);
    }

    match args[1].as_str() {
        "stages" => list_stages(),
        "schedule" => {
            if args.len() < 3 {
                eprintln!("Error: Please specify an image size, e.g. 128x132x48");
                return Ok(());
            }
            print_schedule(&args[2], &config)?;
        }
        "info" => {
            if args.len() < 3 {
                eprintln!("Error: Please specify an image file");
                return Ok(());
            }
            print_information(&args[2])?;
        }
        "pyramid" => {
            if args.len() < 4 {
                eprintln!("Error: Please specify input and output paths");
                eprintln!("Usage: {} pyramid <input> <output>", program);
                return Ok(());
            }
            write_pyramid(&args[2], &args[3], &config)?;
        }
        "compare" => {
            if args.len() < 4 {
                eprintln!("Error: Please specify baseline and test images");
                return Ok(());
            }
            compare(&args[2], &args[3])?;
        }
        "help" | "--help" | "-h" => print_usage(&program),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(&program);
        }
    }

    run_comparison(&options)
}

fn init_logging(config: &DriverConfig) {
    let level = config.log_level.as_deref().unwrap_or("warn");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn print_usage(program: &str) {
    println!("Usage: {} [driver options] <command> [arguments]", program);
    println!();
    println!("Commands:");
    println!("  stages                       List all registered stages");
    println!("  schedule <size>              Print the pyramid schedule for a size like 64x64x32");
    println!("  info <file>                  Show extent and geometry of an image file");
    println!("  pyramid <input> <output>     Write every pyramid level of an image");
    println!("  compare <baseline> <test>    Compare two images pixel by pixel");
    println!("  help                         Show this help message");
    println!();
    println!("Driver options:");
    println!("  --config <file>              TOML configuration (execution and pyramid)");
    println!("  --with-threads <n>           Worker threads for per-pixel work");
    println!("  --log-level <level>          Log filter when RUST_LOG is unset");
    println!("  --compare <baseline> <test>  Compare two images after the command");
}

fn list_stages() {
    let registry = StageRegistry::with_builtins();
    let grouped = registry.grouped_by_category();

    println!("Available stages ({} total):", registry.len());
    println!();

    for (category, stages) in grouped {
        println!("  📁 {}", category.display_name());
        for metadata in stages {
            println!("      • {} - {}", metadata.id, metadata.description);
        }
        println!();
    }
}

fn parse_size(text: &str) -> Option<Vec<usize>> {
    text.split('x')
        .map(|part| part.trim().parse().ok().filter(|&n: &usize| n > 0))
        .collect()
}

fn print_schedule(size: &str, config: &DriverConfig) -> anyhow::Result<()> {
    let size = parse_size(size).with_context(|| format!("'{}' is not a size like 64x64", size))?;
    let computer = config.pyramid.schedule_computer(size.len())?;
    let region = Region::from_size(&size);
    let geometry = PhysicalGeometry::identity(size.len());

    println!("Schedule ({} levels, coarsest first):", computer.number_of_levels());
    for level in 0..computer.number_of_levels() {
        let reduced = computer.level_geometry(level, &region, &geometry)?;
        println!(
            "  Level {}: factors {:?} -> size {:?}, spacing {:?}",
            level,
            reduced.factors,
            reduced.region.size(),
            reduced.geometry.spacing()
        );
    }
    if !computer.is_downward_divisible() {
        println!("⚠️  Schedule is not downward divisible");
    }
    println!();
    println!("{}", serde_json::to_string_pretty(computer.schedule())?);
    Ok(())
}

fn print_information(path: &str) -> anyhow::Result<()> {
    let info = io::read_information(path).with_context(|| format!("reading {}", path))?;
    println!("File: {}", path);
    println!("Pixel type: {}", info.pixel_type);
    println!("Region: {}", info.region);
    println!("Origin: {:?}", info.geometry.origin());
    println!("Spacing: {:?}", info.geometry.spacing());
    println!("Direction: {:?}", info.geometry.direction());
    Ok(())
}

fn level_path(output: &Path, level: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pyramid".to_string());
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mha".to_string());
    output.with_file_name(format!("{}_level{}.{}", stem, level, extension))
}

fn write_pyramid(input: &str, output: &str, config: &DriverConfig) -> anyhow::Result<()> {
    let info = io::read_information(input).with_context(|| format!("reading {}", input))?;
    let computer = config.pyramid.schedule_computer(info.region.dimension())?;
    let levels = computer.number_of_levels();

    let mut pipeline = Pipeline::new();
    let source = pipeline.add_labeled_stage(Box::new(FileSource::new(input)), "reader");
    let pyramid = pipeline.add_stage(Box::new(MultiResolutionPyramid::from_schedule_computer(
        computer,
    )));
    pipeline.connect(source, 0, pyramid, 0)?;

    println!("🔍 Validating pipeline...");
    let report = ValidationPipeline::default().validate(&pipeline);
    for warning in &report.warnings {
        println!("⚠️  {}", warning.message);
    }
    if !report.can_execute() {
        for error in report.detailed_errors() {
            eprintln!("   {}", error);
        }
        bail!("validation failed: {}", report.summary());
    }

    println!("⚙️  Building {} levels from {}", levels, input);
    let executor = PipelineExecutor::with_options(config.execution.clone());
    executor.add_observer(|event| match event {
        ProgressEvent::StageStarted { name, .. } => println!("   • Running: {}", name),
        ProgressEvent::StageFailed { message, .. } => eprintln!("❌ Error: {}", message),
        _ => {}
    });
    let stats = executor.update_largest_possible_region(&mut pipeline, pyramid, levels - 1)?;
    println!(
        "✅ Complete in {}ms ({} stages)",
        stats.total_duration.as_millis(),
        stats.stages_executed
    );
    log::info!("Execution stats: {}", serde_json::to_string(&stats)?);

    for level in 0..levels {
        let path = level_path(Path::new(output), level);
        let container = pipeline.output(pyramid, level)?;
        io::write(&path, container).with_context(|| format!("writing {}", path.display()))?;
        println!("🎉 Level {} {} saved to: {}", level, container.buffered_region(), path.display());
    }
    Ok(())
}

fn compare(baseline: impl AsRef<Path>, test: impl AsRef<Path>) -> anyhow::Result<()> {
    let (baseline, test) = (baseline.as_ref(), test.as_ref());
    let difference = cli::compare_images(baseline, test, 0.0)
        .with_context(|| format!("comparing {} with {}", baseline.display(), test.display()))?;
    println!(
        "Compared {} pixels: {} differ, max difference {}",
        difference.pixels, difference.differing, difference.max_difference
    );
    if !difference.is_match() {
        bail!("{} differs from baseline {}", test.display(), baseline.display());
    }
    println!("✅ Images match");
    Ok(())
}

fn run_comparison(options: &DriverOptions) -> anyhow::Result<()> {
    match &options.compare {
        Some((baseline, test)) => compare(baseline, test),
        None => Ok(()),
    }
}
