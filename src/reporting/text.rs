//! Plain-text analysis report

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::analysis::AnalysisOutcome;
use crate::types::{EnergySummary, MachineState};

const RULE: &str = "==================================================";
const SUBRULE: &str = "--------------------";

/// Share of anomalous cycles above which the rate counts as high
const HIGH_ANOMALY_RATE: f64 = 0.1;

/// Average quality score below which the process needs review
const LOW_QUALITY_SCORE: f64 = 0.7;

/// Recommendations derived from anomaly rate and average quality.
pub fn recommendations(outcome: &AnalysisOutcome) -> Vec<&'static str> {
    let mut recs = Vec::new();
    let anomalous = outcome.anomalous_units().len();
    let cycles = outcome.cycles.len();

    if anomalous > 0 {
        let rate = if cycles > 0 {
            anomalous as f64 / cycles as f64
        } else {
            0.0
        };
        if rate > HIGH_ANOMALY_RATE {
            recs.push("High anomalous unit rate detected. Investigate root causes.");
        } else {
            recs.push("Some anomalous units detected. Monitor production process.");
        }
    }
    if let Some(summary) = &outcome.quality.summary {
        if summary.average_quality_score < LOW_QUALITY_SCORE {
            recs.push("Low average quality score. Review production process.");
        }
    }
    if recs.is_empty() {
        recs.push("No significant issues detected. Continue monitoring.");
    }
    recs
}

pub fn render_text_report(machine_name: &str, outcome: &AnalysisOutcome, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, machine_name, outcome, generated_at);
    out
}

fn section(out: &mut String, title: &str) -> std::fmt::Result {
    writeln!(out, "{title}")?;
    writeln!(out, "{SUBRULE}")
}

fn write_report(
    out: &mut String,
    machine_name: &str,
    outcome: &AnalysisOutcome,
    generated_at: DateTime<Utc>,
) -> std::fmt::Result {
    writeln!(out, "{RULE}")?;
    writeln!(out, "MACHINE ENERGY ANALYSIS REPORT")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Machine: {machine_name}")?;
    writeln!(out, "Generated on: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out)?;

    let average_quality = outcome
        .quality
        .summary
        .as_ref()
        .map_or(0.0, |s| s.average_quality_score);
    section(out, "EXECUTIVE SUMMARY")?;
    writeln!(out, "Total Production Cycles: {}", outcome.cycles.len())?;
    writeln!(out, "Anomalous Units: {}", outcome.anomalous_units().len())?;
    writeln!(out, "Average Quality Score: {average_quality:.2}")?;
    writeln!(out)?;

    section(out, "MACHINE STATES")?;
    let total = outcome.distribution.total().max(1) as f64;
    for state in [MachineState::Off, MachineState::Standby, MachineState::Production] {
        let count = outcome.distribution.count(state);
        writeln!(
            out,
            "{:<11} {count:>8} samples ({:.1}%)",
            format!("{state}:"),
            count as f64 / total * 100.0
        )?;
    }
    writeln!(out)?;

    section(out, "PRODUCTION ANALYSIS")?;
    let stats = &outcome.statistics;
    match (
        stats.duration.as_ref().and_then(|d| d.mean),
        stats.energy.as_ref().and_then(|e| e.mean),
        stats.total_energy,
    ) {
        (Some(avg_duration), Some(avg_energy), Some(total_energy)) => {
            writeln!(out, "Average Cycle Duration: {avg_duration:.1} seconds")?;
            writeln!(out, "Average Energy per Cycle: {avg_energy:.1}")?;
            writeln!(out, "Total Energy Consumed: {total_energy:.1}")?;
        }
        _ => writeln!(out, "No production cycles detected.")?,
    }
    writeln!(out)?;

    section(out, "QUALITY ASSESSMENT")?;
    match &outcome.quality.summary {
        Some(summary) => {
            writeln!(out, "Quality Grade Distribution:")?;
            for (grade, count) in &summary.quality_grade_distribution {
                writeln!(out, "  Grade {grade}: {count} cycles")?;
            }
        }
        None => writeln!(out, "No cycles scored.")?,
    }
    writeln!(out)?;

    let anomalous = outcome.anomalous_units();
    if !anomalous.is_empty() {
        section(out, "ANOMALOUS UNITS")?;
        writeln!(out, "Found {} anomalous units:", anomalous.len())?;
        for metric in outcome.quality.metrics.iter().filter(|m| m.is_anomalous) {
            writeln!(out, "  Cycle ID: {} ({})", metric.cycle_id, metric.issues.join("; "))?;
        }
        writeln!(out)?;
    }

    section(out, "ENERGY STATISTICS")?;
    if let Some(energy) = EnergySummary::from_signal(&outcome.processed_signal) {
        writeln!(out, "Total Energy: {:.1}", energy.total_energy)?;
        writeln!(out, "Average Energy: {:.1}", energy.average_energy)?;
        writeln!(out, "Peak Energy: {:.1}", energy.peak_energy)?;
        writeln!(out, "Minimum Energy: {:.1}", energy.minimum_energy)?;
    }
    writeln!(out)?;

    section(out, "RECOMMENDATIONS")?;
    for (i, rec) in recommendations(outcome).iter().enumerate() {
        writeln!(out, "{}. {rec}", i + 1)?;
    }
    writeln!(out)?;

    writeln!(out, "{RULE}")?;
    writeln!(out, "END OF REPORT")?;
    write!(out, "{RULE}")
}
