//! machine-analyzer - Energy-based production analysis CLI
//!
//! Loads a machine's energy log, classifies machine states, segments
//! production cycles, scores their quality and writes the reports.
//!
//! # Usage
//!
//! ```bash
//! # Analyze a CSV log with config from ./analyzer_config.toml (or defaults)
//! machine-analyzer data/press7.csv
//!
//! # Explicit config, overrides and a 30 s deadline
//! machine-analyzer data/press7.json --config press7.toml --window-secs 5 --timeout-secs 30
//!
//! # Generate synthetic input first
//! simulation --hours 4 --output trace.csv && machine-analyzer trace.csv
//! ```
//!
//! # Environment Variables
//!
//! - `MACHINE_ANALYZER_CONFIG`: Path to a TOML config (used when `--config` is absent)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use machine_analyzer::acquisition::{self, DataFormat};
use machine_analyzer::analysis::{self, tracing_observer};
use machine_analyzer::config::AnalyzerConfig;
use machine_analyzer::reporting::{recommendations, ReportGenerator};
use machine_analyzer::AnalysisOutcome;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "machine-analyzer")]
#[command(about = "Machine energy analysis: states, production cycles and quality")]
#[command(version)]
struct CliArgs {
    /// Energy log to analyze (.csv, .json, .txt)
    input: PathBuf,

    /// Input format, when the extension is missing or misleading (csv, json, txt)
    #[arg(long)]
    format: Option<DataFormat>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Machine name shown in reports
    #[arg(long)]
    machine_name: Option<String>,

    /// Rolling-median window in samples
    #[arg(long, conflicts_with = "window_secs")]
    window_size: Option<usize>,

    /// Rolling-median window as a time span in seconds
    #[arg(long)]
    window_secs: Option<f64>,

    /// Threshold level separating standby from production
    #[arg(long)]
    production_threshold: Option<f64>,

    /// Shortest kept cycle in seconds
    #[arg(long)]
    min_duration: Option<f64>,

    /// Longest kept cycle in seconds
    #[arg(long)]
    max_duration: Option<f64>,

    /// Directory for report files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Abort the analysis after this many seconds (0 disables)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip resampling and gap filling
    #[arg(long)]
    no_preprocess: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "MACHINE_ANALYZER_LOG_JSON")]
    log_json: bool,
}

impl CliArgs {
    /// Apply command-line overrides on top of the loaded config.
    fn apply_overrides(&self, config: &mut AnalyzerConfig) {
        if let Some(name) = &self.machine_name {
            config.machine.name.clone_from(name);
        }
        if let Some(window) = self.window_size {
            config.state_detection.window_size = window;
            config.state_detection.window_secs = None;
        }
        if let Some(secs) = self.window_secs {
            config.state_detection.window_secs = Some(secs);
        }
        if let Some(threshold) = self.production_threshold {
            config.state_detection.production_threshold = threshold;
        }
        if let Some(min) = self.min_duration {
            config.segmentation.min_duration_secs = min;
        }
        if let Some(max) = self.max_duration {
            config.segmentation.max_duration_secs = max;
        }
        if let Some(dir) = &self.output_dir {
            config.report.output_dir.clone_from(dir);
        }
        if let Some(secs) = self.timeout_secs {
            config.runtime.timeout_secs = secs;
        }
        if self.no_preprocess {
            config.preprocessing.enabled = false;
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

// ============================================================================
// Console Summary
// ============================================================================

fn print_summary(machine: &str, outcome: &AnalysisOutcome) {
    println!();
    println!("  Analysis complete: {machine}");
    println!();
    for (state, count) in outcome.distribution.iter() {
        println!("    {:<11} {count} samples", format!("{state}:"));
    }
    println!("    Production cycles:  {}", outcome.cycles.len());
    println!("    Anomalous units:    {}", outcome.anomalous_units().len());
    if let Some(summary) = &outcome.quality.summary {
        println!("    Average quality:    {:.2}", summary.average_quality_score);
    }
    println!();
    for (i, rec) in recommendations(outcome).iter().enumerate() {
        println!("  {}. {rec}", i + 1);
    }
    println!();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let mut config = match &args.config {
        Some(path) => AnalyzerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalyzerConfig::load(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration after CLI overrides")?;

    info!(
        machine = %config.machine.name,
        input = %args.input.display(),
        window = %config.rolling_window(),
        "Starting machine energy analysis"
    );

    // Load
    let options = config.load_options();
    let raw = match args.format {
        Some(format) => acquisition::load_signal(&args.input, format, &options),
        None => acquisition::load_signal_auto(&args.input, &options),
    }
    .with_context(|| format!("Failed to load {}", args.input.display()))?;

    let validation = acquisition::validate_data(&raw);
    if let Some(warning) = &validation.warning {
        warn!(negatives = validation.negative_values, "{warning}");
    }

    // Preprocess
    let signal = if config.preprocessing.enabled {
        if !validation.valid {
            warn!(
                missing = validation.missing_values,
                total = validation.total_records,
                "Input has many missing values; they will be interpolated"
            );
        }
        acquisition::preprocess(&raw, config.resample_frequency()).context("Preprocessing failed")?
    } else {
        if !validation.valid {
            bail!(
                "Input data rejected: {}",
                validation.error.as_deref().unwrap_or("invalid data")
            );
        }
        raw
    };
    if let Some(info) = acquisition::data_info(&signal) {
        info!(
            records = info.total_records,
            duration_secs = info.duration_seconds,
            mean = info.energy_mean.unwrap_or(f64::NAN),
            "Signal ready for analysis"
        );
    }

    // Analyze
    let outcome = analysis::run_with_deadline(
        signal,
        config.pipeline_params(),
        tracing_observer(),
        config.deadline(),
    )
    .await
    .context("Analysis failed")?;

    // Report
    let report = &config.report;
    let generator = ReportGenerator::new(&report.output_dir, &config.machine.name)
        .context("Failed to prepare report directory")?;
    let paths = generator
        .generate_all(&outcome, report.text, report.csv, report.json)
        .context("Failed to write reports")?;

    print_summary(&config.machine.name, &outcome);
    for path in [&paths.text, &paths.csv, &paths.json].into_iter().flatten() {
        println!("  Report: {}", path.display());
    }

    info!("✓ Analysis complete");
    Ok(())
}
