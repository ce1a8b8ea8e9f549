//! Machine Power Trace Simulation
//!
//! Generates a synthetic energy log for exercising machine-analyzer.
//! Every production cycle runs through four phases:
//! - Start-up: linear ramp from idle to production power
//! - Production: production power with Gaussian noise
//! - Shut-down: linear ramp back to idle
//! - Idle: standby power with light noise
//!
//! The machine is fully off (exact zeros) before the first and after the
//! last cycle. A fraction of cycles can be made anomalous (power surge or
//! truncated production) so the quality scorer has something to find.
//!
//! # Usage
//! ```bash
//! ./simulation --hours 2 --seed 7 --output trace.csv && ./machine-analyzer trace.csv
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

// ============================================================================
// Phase Fractions
// ============================================================================

/// End of the start-up ramp, as a fraction of the cycle period
const STARTUP_END: f64 = 0.3;
/// End of steady production
const PRODUCTION_END: f64 = 0.7;
/// End of the shut-down ramp; idle for the remainder
const SHUTDOWN_END: f64 = 0.9;

/// Power multiplier during a surge anomaly
const SURGE_FACTOR: f64 = 1.6;
/// Production phase kept by a truncated cycle
const TRUNCATED_SHARE: f64 = 0.4;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Synthetic machine power trace for machine-analyzer testing")]
#[command(version = "1.0")]
struct Args {
    /// Simulated duration in hours (1-24)
    #[arg(short = 'H', long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=24))]
    hours: u32,

    /// Seconds between samples
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=3600))]
    sample_interval: u32,

    /// Production cycle period in seconds
    #[arg(long, default_value = "60")]
    cycle_period: u32,

    /// Steady production power (kW)
    #[arg(long, default_value = "40.0")]
    production_power: f64,

    /// Standby power between cycles (kW)
    #[arg(long, default_value = "2.0")]
    idle_power: f64,

    /// Minutes fully off before the first and after the last cycle
    #[arg(long, default_value = "5")]
    off_minutes: u32,

    /// Share of cycles made anomalous (0.0-1.0)
    #[arg(long, default_value = "0.05")]
    anomaly_rate: f64,

    /// Start timestamp (RFC 3339)
    #[arg(long, default_value = "2024-01-01T08:00:00Z")]
    start: DateTime<Utc>,

    /// Output CSV file (stdout when absent)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Suppress the run log on stderr
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================================
// Cycle Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Off,
    Startup,
    Production,
    Shutdown,
    Idle,
}

impl Phase {
    /// Phase at `fraction` (0..1) through a running cycle.
    fn in_cycle(fraction: f64, truncated: bool) -> Self {
        let production_end = if truncated {
            STARTUP_END + (PRODUCTION_END - STARTUP_END) * TRUNCATED_SHARE
        } else {
            PRODUCTION_END
        };
        match fraction {
            f if f < STARTUP_END => Self::Startup,
            f if f < production_end => Self::Production,
            f if f < SHUTDOWN_END && !truncated => Self::Shutdown,
            _ => Self::Idle,
        }
    }
}

/// How a single cycle deviates from the nominal profile.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CycleKind {
    Nominal,
    Surge,
    Truncated,
}

// ============================================================================
// Simulation State
// ============================================================================

struct Simulation {
    rng: StdRng,
    production_noise: Normal<f64>,
    idle_noise: Normal<f64>,
    production_power: f64,
    idle_power: f64,
    cycle_period: f64,
    anomaly_rate: f64,
    current_cycle: Option<(u64, CycleKind)>,
    cycles_started: u64,
    anomalous_cycles: u64,
}

impl Simulation {
    fn new(args: &Args) -> Result<Self, Box<dyn std::error::Error>> {
        let rng = match args.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            production_noise: Normal::new(0.0, args.production_power * 0.05)?,
            idle_noise: Normal::new(0.0, args.idle_power * 0.1)?,
            production_power: args.production_power,
            idle_power: args.idle_power,
            cycle_period: f64::from(args.cycle_period.max(1)),
            anomaly_rate: if args.anomaly_rate.is_finite() {
                args.anomaly_rate.clamp(0.0, 1.0)
            } else {
                0.0
            },
            current_cycle: None,
            cycles_started: 0,
            anomalous_cycles: 0,
        })
    }

    /// Kind of cycle `cycle_index`, drawn once when the cycle begins.
    fn cycle_kind(&mut self, cycle_index: u64) -> CycleKind {
        if let Some((index, kind)) = self.current_cycle {
            if index == cycle_index {
                return kind;
            }
        }
        let kind = if self.rng.gen_bool(self.anomaly_rate) {
            self.anomalous_cycles += 1;
            if self.rng.gen_bool(0.5) {
                CycleKind::Surge
            } else {
                CycleKind::Truncated
            }
        } else {
            CycleKind::Nominal
        };
        self.cycles_started += 1;
        self.current_cycle = Some((cycle_index, kind));
        kind
    }

    /// Power at `elapsed` seconds into the running window.
    fn sample(&mut self, elapsed: f64) -> (Phase, f64) {
        let cycle_index = (elapsed / self.cycle_period) as u64;
        let fraction = (elapsed % self.cycle_period) / self.cycle_period;
        let kind = self.cycle_kind(cycle_index);
        let phase = Phase::in_cycle(fraction, kind == CycleKind::Truncated);

        let span = self.production_power - self.idle_power;
        let power = match phase {
            Phase::Off => 0.0,
            Phase::Startup => self.idle_power + span * fraction / STARTUP_END,
            Phase::Production => {
                let level = if kind == CycleKind::Surge {
                    self.production_power * SURGE_FACTOR
                } else {
                    self.production_power
                };
                level + self.production_noise.sample(&mut self.rng)
            }
            Phase::Shutdown => {
                self.idle_power
                    + span * (1.0 - (fraction - PRODUCTION_END) / (SHUTDOWN_END - PRODUCTION_END))
            }
            Phase::Idle => self.idle_power + self.idle_noise.sample(&mut self.rng),
        };
        // Standby noise must not dip into the exact-zero off level
        (phase, power.max(0.01))
    }
}

fn format_time(seconds: f64) -> String {
    let hours = (seconds / 3600.0) as u32;
    let minutes = ((seconds % 3600.0) / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

fn log_run(time: f64, message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[{}] {}", format_time(time), message);
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut sim = Simulation::new(&args)?;

    let step = f64::from(args.sample_interval);
    let off_secs = f64::from(args.off_minutes) * 60.0;
    let run_secs = f64::from(args.hours) * 3600.0;
    let total_secs = run_secs + 2.0 * off_secs;
    let total_samples = (total_secs / step) as u64;

    log_run(0.0, &"=".repeat(60), args.quiet);
    log_run(0.0, "MACHINE POWER TRACE SIMULATION", args.quiet);
    log_run(0.0, &"=".repeat(60), args.quiet);
    log_run(0.0, &format!("  Duration: {} hours + {} min off each side", args.hours, args.off_minutes), args.quiet);
    log_run(0.0, &format!("  Samples: {total_samples} every {step} s"), args.quiet);
    log_run(0.0, &format!("  Cycle period: {} s", args.cycle_period), args.quiet);
    log_run(0.0, &format!("  Power: {:.1} kW production / {:.1} kW idle", args.production_power, args.idle_power), args.quiet);
    log_run(0.0, &format!("  Anomaly rate: {:.0}%", sim.anomaly_rate * 100.0), args.quiet);
    if let Some(seed) = args.seed {
        log_run(0.0, &format!("  Random seed: {seed}"), args.quiet);
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    writeln!(out, "timestamp,value")?;

    let mut last_phase = Phase::Off;
    for i in 0..total_samples {
        let t = i as f64 * step;
        let (phase, power) = if t < off_secs || t >= off_secs + run_secs {
            (Phase::Off, 0.0)
        } else {
            sim.sample(t - off_secs)
        };
        if phase != last_phase && (phase == Phase::Off || last_phase == Phase::Off) {
            let message = if phase == Phase::Off { ">>> Machine off" } else { ">>> Machine on" };
            log_run(t, message, args.quiet);
        }
        last_phase = phase;

        let timestamp = args.start + TimeDelta::milliseconds((t * 1000.0) as i64);
        writeln!(out, "{},{power:.3}", timestamp.to_rfc3339())?;
    }
    out.flush()?;

    log_run(total_secs, &"=".repeat(60), args.quiet);
    log_run(total_secs, "SIMULATION COMPLETE", args.quiet);
    log_run(total_secs, &format!("Cycles: {}", sim.cycles_started), args.quiet);
    log_run(total_secs, &format!("Anomalous cycles: {}", sim.anomalous_cycles), args.quiet);
    log_run(total_secs, &"=".repeat(60), args.quiet);

    Ok(())
}
