//! Production cycle records and their population statistics

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// One maximal contiguous production interval that passed the duration filter.
///
/// Created once by the segmenter and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCycle {
    /// Sequential id in segment order, starting at 0
    pub cycle_id: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// `end_time - start_time` in seconds
    pub duration_seconds: f64,
    /// Sum of the values over `[start_time, end_time]`
    pub energy_consumption: f64,
    pub peak_energy: f64,
    pub average_energy: f64,
    /// Coefficient of variation (std / mean), 0 when mean <= 0
    pub variation: f64,
}

impl ProductionCycle {
    pub fn duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }
}

/// Convert a time delta to fractional seconds (millisecond resolution).
pub fn delta_seconds(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}

/// mean / std / min / max / median for one cycle metric.
///
/// Every field is optional so that summaries supplied from outside (for
/// example deserialized from a previous run) may omit keys; a missing
/// `mean` or `std` disables the quality rule that needs it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
}

impl MetricSummary {
    /// `(mean, std)` when both are present.
    pub fn mean_std(&self) -> Option<(f64, f64)> {
        self.mean.zip(self.std)
    }
}

/// Population statistics over all cycles of one run.
///
/// The default value is the empty summary: no cycles, no metrics. It is
/// distinct from a summary whose metrics happen to be zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleStatistics {
    #[serde(skip_serializing_if = "is_zero")]
    pub total_cycles: usize,
    /// Duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<MetricSummary>,
    /// Total energy per cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_energy: Option<MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<MetricSummary>,
    /// Energy summed over every cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_energy: Option<f64>,
}

fn is_zero(count: &usize) -> bool {
    *count == 0
}

impl CycleStatistics {
    pub fn is_empty(&self) -> bool {
        self.total_cycles == 0
            && self.duration.is_none()
            && self.energy.is_none()
            && self.peak_energy.is_none()
            && self.variation.is_none()
            && self.total_energy.is_none()
    }
}
