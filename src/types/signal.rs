//! SignalTable: a single time-ordered energy series

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default name of the energy column when none is given.
pub const DEFAULT_ENERGY_COLUMN: &str = "value";

#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("Timestamp and value lengths differ: {timestamps} timestamps, {values} values")]
    LengthMismatch { timestamps: usize, values: usize },

    #[error("Timestamps must be strictly increasing (index {index}: {previous} >= {current})")]
    NotIncreasing {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// One (timestamp, value) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Time-indexed numeric series with strictly increasing timestamps.
///
/// Values may be NaN (missing) while a table moves through preprocessing;
/// the analysis stages reject or repair them before producing results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalTable {
    column: String,
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl SignalTable {
    /// Build a table, checking that both columns align and the index is strictly increasing.
    pub fn new(
        column: impl Into<String>,
        timestamps: Vec<DateTime<Utc>>,
        values: Vec<f64>,
    ) -> Result<Self, SignalError> {
        if timestamps.len() != values.len() {
            return Err(SignalError::LengthMismatch {
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        for (i, pair) in timestamps.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SignalError::NotIncreasing {
                    index: i + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        Ok(Self {
            column: column.into(),
            timestamps,
            values,
        })
    }

    /// Build a table from samples.
    pub fn from_samples(
        column: impl Into<String>,
        samples: impl IntoIterator<Item = Sample>,
    ) -> Result<Self, SignalError> {
        let (timestamps, values) = samples
            .into_iter()
            .map(|s| (s.timestamp, s.value))
            .unzip();
        Self::new(column, timestamps, values)
    }

    /// Build a table with uniform spacing starting at `start`.
    pub fn uniform(
        column: impl Into<String>,
        start: DateTime<Utc>,
        step: TimeDelta,
        values: Vec<f64>,
    ) -> Result<Self, SignalError> {
        let timestamps = (0..values.len())
            .map(|i| start + step * i32::try_from(i).unwrap_or(i32::MAX))
            .collect();
        Self::new(column, timestamps, values)
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// Time covered from first to last sample (zero for fewer than two samples).
    pub fn span(&self) -> TimeDelta {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => end - start,
            _ => TimeDelta::zero(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.timestamps
            .iter()
            .zip(self.values.iter())
            .map(|(&timestamp, &value)| Sample { timestamp, value })
    }

    /// Index range `[first, last]` of samples with `start <= t <= end`, if any.
    pub fn index_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<(usize, usize)> {
        let first = self.timestamps.partition_point(|t| *t < start);
        let past_last = self.timestamps.partition_point(|t| *t <= end);
        (first < past_last).then(|| (first, past_last - 1))
    }

    /// Values with `start <= t <= end`.
    pub fn values_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[f64] {
        match self.index_range(start, end) {
            Some((first, last)) => &self.values[first..=last],
            None => &[],
        }
    }

    /// Sub-table of the samples where `mask` is true. Extra or missing mask entries are ignored.
    pub fn select(&self, mask: &[bool]) -> Self {
        let (timestamps, values) = self
            .iter()
            .zip(mask.iter())
            .filter(|(_, keep)| **keep)
            .map(|(s, _)| (s.timestamp, s.value))
            .unzip();
        Self {
            column: self.column.clone(),
            timestamps,
            values,
        }
    }

    /// Index of the first non-finite value, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.values.iter().position(|v| !v.is_finite())
    }
}

/// Whole-signal energy totals used by the reports. Missing values are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergySummary {
    pub total_energy: f64,
    pub average_energy: f64,
    pub peak_energy: f64,
    pub minimum_energy: f64,
}

impl EnergySummary {
    /// `None` when the table holds no finite value.
    pub fn from_signal(signal: &SignalTable) -> Option<Self> {
        let finite: Vec<f64> = signal.values().iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let total_energy: f64 = finite.iter().sum();
        Some(Self {
            total_energy,
            average_energy: total_energy / finite.len() as f64,
            peak_energy: finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            minimum_energy: finite.iter().copied().fold(f64::INFINITY, f64::min),
        })
    }
}
