//! Bakau CLI - mangrove / non-mangrove classification from multi-band scenes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use bakau_algorithms::pipeline::{Pipeline, PipelineConfig, PipelineOutput, Scenes};
use bakau_core::io::{read_geotiff, read_labels, GeoTiffDirectorySink, GeoTiffDirectorySource, RasterSink};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "bakau")]
#[command(author, version, about = "Mangrove land-cover classification", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the classification pipeline described by a JSON run file
    Run {
        /// Run file
        run: PathBuf,
        /// Skip writing rasters, only report accuracy
        #[arg(long)]
        no_write: bool,
        /// Also write the feature bands of the classify scene
        #[arg(long)]
        features: bool,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Print the default pipeline configuration as JSON
    Config,
}

/// Contents of a run file; relative paths are taken from the run file's directory
#[derive(Debug, Deserialize)]
struct RunFile {
    #[serde(default)]
    config: PipelineConfig,
    /// Directory holding `<scene>/<band>.tif`
    root: PathBuf,
    scenes: SceneNames,
    bands: Vec<String>,
    /// GeoJSON FeatureCollection of labeled geometries
    labels: PathBuf,
    output: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SceneNames {
    train: String,
    test: String,
    classify: String,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn read_run_file(path: &Path) -> Result<RunFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run file {}", path.display()))?;
    let mut run: RunFile = serde_json::from_str(&text).context("Invalid run file")?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    run.root = resolve(base, &run.root);
    run.labels = resolve(base, &run.labels);
    run.output = resolve(base, &run.output);
    Ok(run)
}

fn report(output: &PipelineOutput) {
    println!("Features: {}", output.feature_names.join(", "));
    println!("Trees: {}", output.model.n_trees());
    println!("\n{}", output.train_accuracy);
    println!("{}", output.test_accuracy);
}

fn run(path: &Path, no_write: bool, features: bool) -> Result<()> {
    let run = read_run_file(path)?;
    let pipeline = Pipeline::new(run.config).context("Invalid pipeline configuration")?;

    let pb = spinner("Reading scenes...");
    let source = GeoTiffDirectorySource::new(&run.root);
    let names = Scenes::new(run.scenes.train, run.scenes.test, run.scenes.classify);
    let scenes = pipeline
        .load_scenes(&source, &names, &run.bands)
        .context("Failed to load scenes")?;
    let labels = read_labels(
        &run.labels,
        &pipeline.config().label_property,
        Some(pipeline.config().classes.as_slice()),
    )
        .with_context(|| format!("Failed to read labels {}", run.labels.display()))?;
    pb.finish_and_clear();
    info!("Labels: {} geometries, classes {:?}", labels.len(), labels.classes());

    let pb = spinner("Running pipeline...");
    let start = Instant::now();
    let output = pipeline.run(&scenes, &labels).context("Pipeline failed")?;
    let elapsed = start.elapsed();
    pb.finish_and_clear();

    report(&output);

    if !no_write {
        let pb = spinner("Writing output...");
        let sink = GeoTiffDirectorySink::new(&run.output);
        pipeline
            .write(&output, &sink, "classified")
            .context("Failed to write classification")?;
        if features {
            let stack = &output.scene_features.classify.features;
            let scale = stack.template().context("Empty feature stack")?.cell_size();
            sink.write_stack("features", stack, scale, stack.crs())
                .context("Failed to write feature bands")?;
        }
        pb.finish_and_clear();
        println!("Classification saved to: {}", run.output.join("classified.tif").display());
    }
    println!("  Processing time: {:.2?}", elapsed);
    Ok(())
}

fn info_raster(input: &Path) -> Result<()> {
    let pb = spinner("Reading raster...");
    let raster: bakau_core::Raster<f64> = read_geotiff(input).context("Failed to read raster")?;
    pb.finish_and_clear();

    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = raster.crs() {
        println!("CRS: {}", crs);
    }
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len() as f64
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run { run: path, no_write, features } => run(&path, no_write, features)?,
        Commands::Info { input } => info_raster(&input)?,
        Commands::Config => {
            let json = serde_json::to_string_pretty(&PipelineConfig::default())
                .context("Failed to serialize configuration")?;
            println!("{}", json);
        }
    }

    Ok(())
}
