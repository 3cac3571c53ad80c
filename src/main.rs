use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;

use vehicle_dynamics_rs::config::PipelineConfig;
use vehicle_dynamics_rs::incident::CrashSeverity;
use vehicle_dynamics_rs::ingest::{self, Ingested};
use vehicle_dynamics_rs::pipeline::{AnalysisMode, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "vehicle_dynamics")]
#[command(
    about = "Crash detection and mass estimation from logged IMU telemetry",
    long_about = None
)]
struct Args {
    /// Logger text file (`Time: .. | GPS: .. | Accel: .. | Roll: .. | Pitch: .. | Yaw: ..`)
    #[arg(long, conflicts_with = "table")]
    log: Option<PathBuf>,

    /// JSON sample table (.json or .json.gz)
    #[arg(long)]
    table: Option<PathBuf>,

    /// Analysis to run (crash, mass, all)
    #[arg(long, default_value = "all")]
    mode: AnalysisMode,

    /// JSON config file; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Motor force override (N)
    #[arg(long)]
    motor_force: Option<f64>,

    /// Wheel radius override (equivalent mass factor)
    #[arg(long)]
    wheel_radius: Option<f64>,

    /// Crash cooldown override (seconds)
    #[arg(long)]
    cooldown: Option<f64>,

    /// Output directory
    #[arg(long, default_value = "vehicle_dynamics_sessions")]
    output_dir: String,
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => PipelineConfig::default(),
    };
    if let Some(force) = args.motor_force {
        config.motor_force = force;
    }
    if let Some(radius) = args.wheel_radius {
        config.wheel_radius = radius;
    }
    if let Some(cooldown) = args.cooldown {
        config.cooldown_time = cooldown;
    }
    Ok(config)
}

fn load_samples(args: &Args) -> Result<Ingested> {
    match (&args.log, &args.table) {
        (Some(path), None) => ingest::load_log_file(path)
            .with_context(|| format!("Failed to read log {:?}", path)),
        (None, Some(path)) => ingest::load_table_file(path)
            .with_context(|| format!("Failed to read table {:?}", path)),
        _ => bail!("Provide exactly one of --log or --table"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("Vehicle dynamics analysis starting");
    log::info!("  Mode: {}", args.mode);
    log::info!("  Output Dir: {}", args.output_dir);

    let config = load_config(&args)?;
    let pipeline = Pipeline::new(config)?;

    let ingested = load_samples(&args)?;
    let report = pipeline
        .analyze(&ingested.samples, args.mode)
        .context("Analysis failed")?;

    std::fs::create_dir_all(&args.output_dir)?;
    let filename = format!("{}/analysis_{}.json", args.output_dir, ts_now_clean());
    report
        .save(&filename)
        .with_context(|| format!("Failed to write {}", filename))?;

    println!("\n=== Results ===");
    println!(
        "- Data points: {} read, {} skipped",
        ingested.stats.rows_parsed, ingested.stats.rows_skipped
    );
    if args.mode.runs_crash() {
        println!("- Small crashes: {}", report.small_crash_count);
        println!(
            "  Times (s from start): {}",
            format_times(&report.crash_times(CrashSeverity::Small))
        );
        println!("- Large crashes: {}", report.large_crash_count);
        println!(
            "  Times (s from start): {}",
            format_times(&report.crash_times(CrashSeverity::Large))
        );
    }
    if let Some(mass) = &report.mass {
        println!(
            "- Moving samples: {}, {} during acceleration",
            mass.moving_samples,
            mass.records.len()
        );
        println!("- Window size: {} points ({:?})", mass.window_size, mass.window_policy);
        println!("- Final mass estimate: {:.1} kg", mass.final_mass_estimate);
    }
    println!("- Report saved to: {}", filename);

    Ok(())
}

fn format_times(times: &[f64]) -> String {
    let parts: Vec<String> = times.iter().map(|t| format!("{:.2}", t)).collect();
    format!("[{}]", parts.join(", "))
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
