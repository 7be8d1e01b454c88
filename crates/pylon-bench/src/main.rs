//! pylon-bench: CLI tool for running the extraction pipeline on point files.
//!
//! Runs the pipeline on each given XYZ/CSV file (or a built-in synthetic
//! corridor) with configurable parameters, printing per-stage diagnostics
//! and the resulting power-line parameter table. Useful for:
//!
//! - Tuning ground filter and DBSCAN parameters against real surveys
//! - Measuring per-stage durations to identify bottlenecks
//! - Checking whether a survey yields measured or synthetic parameters
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin pylon-bench -- [OPTIONS] [POINTS]...
//! RUST_LOG=debug cargo run --bin pylon-bench -- --demo
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod input;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use log::LevelFilter;
use pylon_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use pylon_pipeline::{ClusterConfig, GroundConfig, PipelineConfig, PointCloud, Session, scene};

/// Power-corridor extraction diagnostics for pylon.
///
/// Runs the extraction pipeline on each point file and prints detailed
/// per-stage timing, counts and the power-line parameters found.
#[derive(Parser)]
#[command(name = "pylon-bench", version)]
struct Cli {
    /// Point files: `.csv` (comma-separated) or whitespace-separated XYZ.
    #[arg(required_unless_present = "demo")]
    points: Vec<PathBuf>,

    /// Also process the built-in synthetic corridor scene.
    #[arg(long)]
    demo: bool,

    /// Ground grid cell size.
    #[arg(long, default_value_t = GroundConfig::DEFAULT_CELL_SIZE)]
    cell_size: f64,

    /// Largest morphological window size.
    #[arg(long, default_value_t = GroundConfig::DEFAULT_MAX_WINDOW_SIZE)]
    max_window_size: f64,

    /// Terrain slope threshold for the ground filter.
    #[arg(long, default_value_t = GroundConfig::DEFAULT_SLOPE_THRESHOLD)]
    slope_threshold: f64,

    /// Slope multiplier in the ground height threshold.
    #[arg(long, default_value_t = GroundConfig::DEFAULT_MAX_DISTANCE)]
    max_distance: f64,

    /// Base ground height threshold.
    #[arg(long, default_value_t = GroundConfig::DEFAULT_INITIAL_DISTANCE)]
    initial_distance: f64,

    /// Largest ground grid (columns x rows) accepted before a cloud is rejected.
    #[arg(long, default_value_t = GroundConfig::DEFAULT_MAX_CELLS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_cells: usize,

    /// DBSCAN neighborhood radius.
    #[arg(long, default_value_t = ClusterConfig::DEFAULT_EPS)]
    eps: f64,

    /// DBSCAN core point neighborhood size.
    #[arg(long, default_value_t = ClusterConfig::DEFAULT_MIN_POINTS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    min_points: usize,

    /// Seed for synthetic parameter jitter.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SEED)]
    seed: u64,

    /// Number of runs per input for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        ground: GroundConfig {
            cell_size: cli.cell_size,
            max_window_size: cli.max_window_size,
            slope_threshold: cli.slope_threshold,
            max_distance: cli.max_distance,
            initial_distance: cli.initial_distance,
            max_cells: cli.max_cells,
        },
        cluster: ClusterConfig {
            eps: cli.eps,
            min_points: cli.min_points,
            ..ClusterConfig::default()
        },
        seed: cli.seed,
        ..PipelineConfig::default()
    })
}

/// A named cloud ready to process.
struct Input {
    name: String,
    cloud: PointCloud,
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter(None, LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut inputs = Vec::new();
    let mut load_failures = 0usize;
    if cli.demo {
        inputs.push(Input {
            name: "demo corridor".to_string(),
            cloud: scene::corridor(cli.seed).cloud,
        });
    }
    for path in &cli.points {
        match input::load(path) {
            Ok(loaded) => {
                eprintln!(
                    "Points: {} ({} points, {} rows skipped)",
                    path.display(),
                    loaded.cloud.len(),
                    loaded.skipped_rows,
                );
                inputs.push(Input {
                    name: path.display().to_string(),
                    cloud: loaded.cloud,
                });
            }
            Err(e) => {
                eprintln!("Error reading {}: {e}", path.display());
                load_failures += 1;
            }
        }
    }

    let mut session = Session::new(config);
    for Input { name, cloud } in inputs {
        eprintln!("=== {name} ===");
        let all_diagnostics = run_input(&mut session, &name, &cloud, &cli);
        if cli.runs > 1 && !all_diagnostics.is_empty() {
            print_multi_run_summary(&all_diagnostics);
        }
        eprintln!();
    }

    print_parameter_table(&session);

    let failures = session.failures().count() + load_failures;
    if failures > 0 {
        eprintln!("{failures} input(s) failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Process one cloud `cli.runs` times, printing each run's diagnostics.
///
/// The first run's outcome is recorded in `session`; a failing input
/// stops after its first run.
fn run_input(
    session: &mut Session,
    name: &str,
    cloud: &PointCloud,
    cli: &Cli,
) -> Vec<PipelineDiagnostics> {
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let outcome = pylon_pipeline::diagnostics::process_with_diagnostics(
            cloud.clone(),
            session.config(),
            &StdClock,
        );
        match outcome {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => eprintln!("Error serializing diagnostics: {e}"),
                    }
                } else {
                    println!("{}", diagnostics.report());
                }
                if run == 0 {
                    session.record(name, Ok(result));
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                session.record(name, Err(e));
                break;
            }
        }
    }

    all_diagnostics
}

/// Print every parameter record produced in the session.
fn print_parameter_table(session: &Session) {
    if session.successes().next().is_none() {
        return;
    }

    println!();
    println!(
        "{:<24} {:<8} {:>9} {:>10} {:>9} {:>10}",
        "Source", "Name", "Length", "Width", "Sag", "Kind"
    );
    println!("{}", "-".repeat(76));
    for (source, p) in session.parameters() {
        println!(
            "{source:<24} {:<8} {:>8.1}m {:>8.1}mm {:>8.2}m {:>10?}",
            p.name, p.length, p.conductor_width_mm, p.max_sag, p.provenance,
        );
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len().max(1) as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Ground Segmentation", |d| d.ground.duration),
        ("Clustering", |d| d.clustering.duration),
        ("Classification", |d| d.classification.duration),
        ("Curve Fitting", |d| d.curve_fitting.duration),
        ("Synthesis", |d| d.synthesis.duration),
    ];

    for (name, extractor) in stage_extractors {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
