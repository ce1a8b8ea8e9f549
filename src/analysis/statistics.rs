//! Numeric helpers over ordered (timestamp, value) sequences
//!
//! Everything here is a pure function of its inputs: summary statistics
//! (statrs), linear-interpolated quantiles, the centered rolling medians used
//! for the dynamic threshold (by sample count or time span), IQR outlier
//! bounds and time-weighted interpolation of missing values.

use chrono::{DateTime, TimeDelta, Utc};
use statrs::statistics::{Data, Median, Statistics};
use thiserror::Error;

use crate::types::MetricSummary;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("No valid sample to anchor interpolation ({0} values, all missing)")]
    NoAnchor(usize),

    #[error("Timestamp and value lengths differ: {0} vs {1}")]
    LengthMismatch(usize, usize),
}

// ============================================================================
// Summary statistics
// ============================================================================

pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| Statistics::mean(values))
}

/// Population standard deviation (divides by n).
pub fn population_std(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| Statistics::population_std_dev(values))
}

/// Sample standard deviation (divides by n - 1); 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        0.0
    } else {
        Statistics::std_dev(values)
    }
}

pub fn min(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| Statistics::min(values))
}

pub fn max(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| Statistics::max(values))
}

pub fn median(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| Data::new(values.to_vec()).median())
}

/// Quantile `q` in [0, 1] using linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

/// mean / population std / min / max / median of a metric across cycles.
pub fn summarize(values: &[f64]) -> Option<MetricSummary> {
    if values.is_empty() {
        return None;
    }
    Some(MetricSummary {
        mean: mean(values),
        std: population_std(values),
        min: min(values),
        max: max(values),
        median: median(values),
    })
}

// ============================================================================
// Rolling median
// ============================================================================

/// Finite values of the current window kept sorted, plus a count of the
/// non-finite ones.
#[derive(Debug, Default)]
struct SortedWindow {
    sorted: Vec<f64>,
    non_finite: usize,
}

impl SortedWindow {
    fn insert(&mut self, value: f64) {
        if value.is_finite() {
            let at = self.sorted.partition_point(|v| *v < value);
            self.sorted.insert(at, value);
        } else {
            self.non_finite += 1;
        }
    }

    fn remove(&mut self, value: f64) {
        if value.is_finite() {
            let at = self.sorted.partition_point(|v| *v < value);
            if at < self.sorted.len() {
                self.sorted.remove(at);
            }
        } else {
            self.non_finite = self.non_finite.saturating_sub(1);
        }
    }

    fn median(&self) -> Option<f64> {
        (self.non_finite == 0 && !self.sorted.is_empty())
            .then(|| quantile_sorted(&self.sorted, 0.5))
    }
}

/// Median over the inclusive index range `window(i)` at every position.
///
/// Ranges must never move backward. A `None` range yields `None`. Returns
/// `None` as soon as `stop` reports true; it is polled once per position.
fn sliding_median(
    values: &[f64],
    window: impl Fn(usize) -> Option<(usize, usize)>,
    stop: &dyn Fn() -> bool,
) -> Option<Vec<Option<f64>>> {
    let mut current = SortedWindow::default();
    // values[lo..hi] is in the window
    let (mut lo, mut hi) = (0, 0);
    let mut medians = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if stop() {
            return None;
        }
        let Some((start, end)) = window(i) else {
            medians.push(None);
            continue;
        };
        while hi <= end {
            current.insert(values[hi]);
            hi += 1;
        }
        while lo < start {
            current.remove(values[lo]);
            lo += 1;
        }
        medians.push(current.median());
    }
    Some(medians)
}

/// Centered rolling median with complete windows only.
///
/// The window is clamped to `[1, len]`. For window `w` the sample at `i` uses
/// indices `i - w/2 ..= i + (w-1)/2`, so an even window leans one sample to
/// the past. Positions whose window runs off either end, or contains a
/// non-finite value, yield `None`.
pub fn centered_rolling_median(values: &[f64], window: usize) -> Vec<Option<f64>> {
    centered_rolling_median_until(values, window, &|| false).unwrap_or_default()
}

/// [`centered_rolling_median`] that gives up (`None`) once `stop` returns true.
pub fn centered_rolling_median_until(
    values: &[f64],
    window: usize,
    stop: &dyn Fn() -> bool,
) -> Option<Vec<Option<f64>>> {
    let n = values.len();
    let w = window.clamp(1, n.max(1));
    let behind = w / 2;
    let ahead = (w - 1) / 2;
    sliding_median(
        values,
        |i| (i >= behind && i + ahead < n).then(|| (i - behind, i + ahead)),
        stop,
    )
}

/// Centered rolling median over a fixed time span.
///
/// The sample at `t` uses every sample in `(t - span/2, t + span/2]`.
/// Windows near the ends are partial instead of missing, so only a window
/// holding a non-finite value yields `None`. `timestamps` must be sorted and
/// `span / 2` must be positive. Gives up (`None`) once `stop` returns true.
pub fn centered_time_median_until(
    timestamps: &[DateTime<Utc>],
    values: &[f64],
    span: TimeDelta,
    stop: &dyn Fn() -> bool,
) -> Option<Vec<Option<f64>>> {
    let n = values.len().min(timestamps.len());
    let times = &timestamps[..n];
    let half = span / 2;
    sliding_median(
        &values[..n],
        |i| {
            let start = times.partition_point(|&t| t <= times[i] - half);
            let end = times.partition_point(|&t| t <= times[i] + half).checked_sub(1)?;
            (start <= end).then_some((start, end))
        },
        stop,
    )
}

/// Fill gaps by propagating the next valid value backward, then the previous
/// valid value forward. Returns `None` when the series has no valid value.
pub fn fill_backward_then_forward(series: &[Option<f64>]) -> Option<Vec<f64>> {
    let mut filled = series.to_vec();

    let mut next_valid = None;
    for slot in filled.iter_mut().rev() {
        match slot {
            Some(v) => next_valid = Some(*v),
            None => *slot = next_valid,
        }
    }

    let mut previous_valid = None;
    for slot in &mut filled {
        match slot {
            Some(v) => previous_valid = Some(*v),
            None => *slot = previous_valid,
        }
    }

    filled.into_iter().collect()
}

// ============================================================================
// IQR bounds
// ============================================================================

/// Acceptance range `[lower, upper]` for one state's values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Strictly outside `[lower, upper]`. NaN bounds never flag a value.
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }

    pub fn is_nan(&self) -> bool {
        self.lower.is_nan() || self.upper.is_nan()
    }
}

/// `mean - lower_coeff * IQR` and `mean + upper_coeff * IQR`.
///
/// An empty input yields NaN bounds.
pub fn iqr_bounds(values: &[f64], lower_coeff: f64, upper_coeff: f64) -> IqrBounds {
    let (Some(center), Some(q1), Some(q3)) =
        (mean(values), quantile(values, 0.25), quantile(values, 0.75))
    else {
        return IqrBounds {
            lower: f64::NAN,
            upper: f64::NAN,
        };
    };
    let iqr = q3 - q1;
    IqrBounds {
        lower: center - iqr * lower_coeff,
        upper: center + iqr * upper_coeff,
    }
}

// ============================================================================
// Time-weighted interpolation
// ============================================================================

fn epoch_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1_000_000.0
}

/// Replace NaN values in place.
///
/// Interior gaps are filled linearly between the two bounding valid samples,
/// weighted by elapsed time. Leading and trailing gaps take the nearest valid
/// value. An empty series is left untouched.
pub fn interpolate_time(
    timestamps: &[DateTime<Utc>],
    values: &mut [f64],
) -> Result<(), InterpolationError> {
    if timestamps.len() != values.len() {
        return Err(InterpolationError::LengthMismatch(timestamps.len(), values.len()));
    }
    if values.is_empty() {
        return Ok(());
    }

    let anchors: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    let (Some(&first), Some(&last)) = (anchors.first(), anchors.last()) else {
        return Err(InterpolationError::NoAnchor(values.len()));
    };

    let leading = values[first];
    values[..first].fill(leading);
    let trailing = values[last];
    values[last + 1..].fill(trailing);

    for pair in anchors.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        if right - left < 2 {
            continue;
        }
        let t0 = epoch_seconds(timestamps[left]);
        let t1 = epoch_seconds(timestamps[right]);
        let (v0, v1) = (values[left], values[right]);
        for i in left + 1..right {
            let weight = (epoch_seconds(timestamps[i]) - t0) / (t1 - t0);
            values[i] = v0 + weight * (v1 - v0);
        }
    }
    Ok(())
}
