//! Data Preparation
//!
//! Turns a freshly loaded series into analysis input:
//!
//! 1. Resample to a fixed frequency (mean per bucket, buckets aligned to the Unix epoch)
//! 2. Treat negative readings as missing
//! 3. Fill interior gaps by time-weighted interpolation
//! 4. Extend the first and last valid values over leading and trailing gaps
//!
//! Also provides the load-time validation and data-info summaries.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::analysis::statistics::{self, interpolate_time, InterpolationError};
use crate::types::{delta_seconds, SignalError, SignalTable};

/// More than this share of missing values makes a dataset invalid
pub const MAX_MISSING_RATIO: f64 = 0.1;

/// Upper bound on resampled length, guards against a tiny frequency over a long span
pub const MAX_RESAMPLED_POINTS: i64 = 50_000_000;

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("No data available for preprocessing")]
    EmptySignal,

    #[error("Resample frequency must be positive, got {0} ms")]
    InvalidFrequency(i64),

    #[error("Resampling would produce {0} points")]
    TooManyPoints(i64),

    #[error("No valid energy values to interpolate from")]
    NoValidValues,

    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl From<InterpolationError> for PreprocessError {
    fn from(_: InterpolationError) -> Self {
        Self::NoValidValues
    }
}

/// Bucket mean at `frequency`. Missing values are ignored; empty buckets are NaN.
pub fn resample(signal: &SignalTable, frequency: TimeDelta) -> Result<SignalTable, PreprocessError> {
    let step_ms = frequency.num_milliseconds();
    if step_ms <= 0 {
        return Err(PreprocessError::InvalidFrequency(step_ms));
    }
    let (Some(start), Some(end)) = (signal.start_time(), signal.end_time()) else {
        return Err(PreprocessError::EmptySignal);
    };

    let bucket_of = |t: DateTime<Utc>| t.timestamp_millis().div_euclid(step_ms);
    let first_bucket = bucket_of(start);
    let buckets = bucket_of(end) - first_bucket + 1;
    if buckets > MAX_RESAMPLED_POINTS {
        return Err(PreprocessError::TooManyPoints(buckets));
    }

    let len = usize::try_from(buckets).map_err(|_| PreprocessError::TooManyPoints(buckets))?;
    let mut sums = vec![0.0; len];
    let mut counts = vec![0usize; len];
    for sample in signal.iter().filter(|s| !s.value.is_nan()) {
        // In range: timestamps are sorted, so every bucket lies in [first, last]
        let slot = (bucket_of(sample.timestamp) - first_bucket) as usize;
        sums[slot] += sample.value;
        counts[slot] += 1;
    }

    let values = sums
        .iter()
        .zip(&counts)
        .map(|(&sum, &n)| if n == 0 { f64::NAN } else { sum / n as f64 })
        .collect();
    let origin = DateTime::<Utc>::from_timestamp_millis(first_bucket * step_ms)
        .ok_or(PreprocessError::TooManyPoints(buckets))?;
    Ok(SignalTable::uniform(signal.column_name(), origin, frequency, values)?)
}

/// Resample, drop negatives and fill every gap.
pub fn preprocess(signal: &SignalTable, frequency: TimeDelta) -> Result<SignalTable, PreprocessError> {
    let mut processed = resample(signal, frequency)?;

    let mut negatives = 0usize;
    for v in processed.values_mut() {
        if *v < 0.0 {
            *v = f64::NAN;
            negatives += 1;
        }
    }
    let missing = processed.values().iter().filter(|v| v.is_nan()).count();

    let timestamps = processed.timestamps().to_vec();
    interpolate_time(&timestamps, processed.values_mut())?;

    info!(
        records = processed.len(),
        frequency_ms = frequency.num_milliseconds(),
        negatives_removed = negatives,
        filled = missing,
        "Preprocessed energy data"
    );
    Ok(processed)
}

// ============================================================================
// Validation & info
// ============================================================================

/// Load-time data quality check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataValidation {
    pub valid: bool,
    pub total_records: usize,
    pub missing_values: usize,
    pub negative_values: usize,
    pub zero_values: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub fn validate_data(signal: &SignalTable) -> DataValidation {
    let values = signal.values();
    let missing_values = values.iter().filter(|v| v.is_nan()).count();
    let negative_values = values.iter().filter(|&&v| v < 0.0).count();

    let mut validation = DataValidation {
        valid: true,
        total_records: signal.len(),
        missing_values,
        negative_values,
        zero_values: values.iter().filter(|&&v| v == 0.0).count(),
        start_time: signal.start_time(),
        end_time: signal.end_time(),
        duration_seconds: delta_seconds(signal.span()),
        error: None,
        warning: None,
    };

    if signal.is_empty() {
        validation.valid = false;
        validation.error = Some("No data available".to_string());
    } else if missing_values as f64 > signal.len() as f64 * MAX_MISSING_RATIO {
        validation.valid = false;
        validation.error = Some("Too many missing values".to_string());
    }
    if negative_values > 0 {
        validation.warning = Some("Negative energy values detected".to_string());
    }

    if validation.valid {
        info!(
            records = validation.total_records,
            missing = validation.missing_values,
            negatives = validation.negative_values,
            "Data validation passed"
        );
    } else {
        warn!(
            records = validation.total_records,
            missing = validation.missing_values,
            error = validation.error.as_deref().unwrap_or_default(),
            "Data validation failed"
        );
    }
    validation
}

/// Descriptive summary of a loaded series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataInfo {
    pub total_records: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub energy_min: Option<f64>,
    pub energy_max: Option<f64>,
    pub energy_mean: Option<f64>,
    /// Sample standard deviation
    pub energy_std: Option<f64>,
    pub missing_values: usize,
}

/// `None` for an empty table.
pub fn data_info(signal: &SignalTable) -> Option<DataInfo> {
    let (start_time, end_time) = (signal.start_time()?, signal.end_time()?);
    let finite: Vec<f64> = signal.values().iter().copied().filter(|v| !v.is_nan()).collect();
    Some(DataInfo {
        total_records: signal.len(),
        start_time,
        end_time,
        duration_seconds: delta_seconds(signal.span()),
        energy_min: statistics::min(&finite),
        energy_max: statistics::max(&finite),
        energy_mean: statistics::mean(&finite),
        energy_std: (finite.len() > 1).then(|| statistics::sample_std(&finite)),
        missing_values: signal.len() - finite.len(),
    })
}
