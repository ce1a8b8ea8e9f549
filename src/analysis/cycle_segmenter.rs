//! Production Cycle Segmentation
//!
//! Splits the production mask into maximal runs of consecutive `true`
//! samples, keeps the runs whose duration lies within
//! `[min_duration, max_duration]` (inclusive), and turns each kept run into a
//! `ProductionCycle` with energy totals and coefficient of variation.
//!
//! Runs are found with a single pass over the mask in index order: a run
//! opens when the value flips to `true` and closes on the next flip or at the
//! end of the sequence.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::observer::{tracing_observer, SharedObserver, Stage};
use super::statistics::{mean, sample_std, summarize};
use crate::types::{delta_seconds, CycleStatistics, ProductionCycle, SignalTable};

/// Default minimum cycle duration (seconds)
pub const DEFAULT_MIN_DURATION_SECS: f64 = 5.0;

/// Default maximum cycle duration (seconds)
pub const DEFAULT_MAX_DURATION_SECS: f64 = 300.0;

#[derive(Debug, Error, PartialEq)]
pub enum SegmentationError {
    #[error("Production mask length {actual} does not match signal length {expected}")]
    MaskLengthMismatch { expected: usize, actual: usize },

    #[error("Invalid duration range [{min}, {max}] seconds")]
    InvalidDurationRange { min: f64, max: f64 },

    #[error("Non-finite energy value {value} at index {index}")]
    NonFiniteValue { index: usize, value: f64 },
}

/// One kept run of production samples, before metrics are computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductionSegment {
    /// First sample index (inclusive)
    pub start_index: usize,
    /// Last sample index (inclusive)
    pub end_index: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ProductionSegment {
    pub fn duration_seconds(&self) -> f64 {
        delta_seconds(self.end_time - self.start_time)
    }

    pub fn sample_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Maximal runs of `true` as inclusive `(first, last)` index pairs.
pub fn production_runs(mask: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut open: Option<usize> = None;

    for (i, &active) in mask.iter().enumerate() {
        match (open, active) {
            (None, true) => open = Some(i),
            (Some(start), false) => {
                runs.push((start, i - 1));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        runs.push((start, mask.len() - 1));
    }
    runs
}

/// Cycle segmenter with an inclusive duration filter.
pub struct CycleSegmenter {
    min_duration_secs: f64,
    max_duration_secs: f64,
    observer: SharedObserver,
}

impl Default for CycleSegmenter {
    fn default() -> Self {
        Self {
            min_duration_secs: DEFAULT_MIN_DURATION_SECS,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            observer: tracing_observer(),
        }
    }
}

impl CycleSegmenter {
    pub fn new(min_duration_secs: f64, max_duration_secs: f64) -> Result<Self, SegmentationError> {
        Self::with_observer(min_duration_secs, max_duration_secs, tracing_observer())
    }

    pub fn with_observer(
        min_duration_secs: f64,
        max_duration_secs: f64,
        observer: SharedObserver,
    ) -> Result<Self, SegmentationError> {
        let valid = min_duration_secs.is_finite()
            && max_duration_secs.is_finite()
            && min_duration_secs >= 0.0
            && min_duration_secs <= max_duration_secs;
        if !valid {
            return Err(SegmentationError::InvalidDurationRange {
                min: min_duration_secs,
                max: max_duration_secs,
            });
        }
        Ok(Self {
            min_duration_secs,
            max_duration_secs,
            observer,
        })
    }

    pub fn duration_range(&self) -> (f64, f64) {
        (self.min_duration_secs, self.max_duration_secs)
    }

    fn accepts(&self, duration_secs: f64) -> bool {
        duration_secs >= self.min_duration_secs && duration_secs <= self.max_duration_secs
    }

    /// Production runs that pass the duration filter, in time order.
    pub fn find_production_segments(
        &self,
        signal: &SignalTable,
        production_mask: &[bool],
    ) -> Result<Vec<ProductionSegment>, SegmentationError> {
        if production_mask.len() != signal.len() {
            return Err(SegmentationError::MaskLengthMismatch {
                expected: signal.len(),
                actual: production_mask.len(),
            });
        }
        let timestamps = signal.timestamps();
        Ok(production_runs(production_mask)
            .into_iter()
            .map(|(start_index, end_index)| ProductionSegment {
                start_index,
                end_index,
                start_time: timestamps[start_index],
                end_time: timestamps[end_index],
            })
            .filter(|segment| self.accepts(segment.duration_seconds()))
            .collect())
    }

    /// Segment the signal into production cycles and summarize them.
    ///
    /// No kept runs yields an empty list and `CycleStatistics::default()`.
    pub fn segment(
        &self,
        signal: &SignalTable,
        production_mask: &[bool],
    ) -> Result<(Vec<ProductionCycle>, CycleStatistics), SegmentationError> {
        self.observer.stage_started(Stage::CycleSegmentation);
        let result = self.segment_inner(signal, production_mask);
        match &result {
            Ok((cycles, stats)) => self.observer.stage_completed(
                Stage::CycleSegmentation,
                &format!(
                    "{} cycles, {:.2} total energy",
                    cycles.len(),
                    stats.total_energy.unwrap_or(0.0)
                ),
            ),
            Err(e) => self
                .observer
                .stage_failed(Stage::CycleSegmentation, &e.to_string()),
        }
        result
    }

    fn segment_inner(
        &self,
        signal: &SignalTable,
        production_mask: &[bool],
    ) -> Result<(Vec<ProductionCycle>, CycleStatistics), SegmentationError> {
        let segments = self.find_production_segments(signal, production_mask)?;

        // Validate every kept sample up front so no partial cycle list escapes
        for segment in &segments {
            let values = &signal.values()[segment.start_index..=segment.end_index];
            if let Some(offset) = values.iter().position(|v| !v.is_finite()) {
                return Err(SegmentationError::NonFiniteValue {
                    index: segment.start_index + offset,
                    value: values[offset],
                });
            }
        }

        let cycles: Vec<ProductionCycle> = segments
            .iter()
            .enumerate()
            .map(|(cycle_id, segment)| Self::build_cycle(signal, cycle_id, segment))
            .collect();
        let stats = Self::calculate_statistics(&cycles);
        Ok((cycles, stats))
    }

    fn build_cycle(signal: &SignalTable, cycle_id: usize, segment: &ProductionSegment) -> ProductionCycle {
        let values = signal.values_between(segment.start_time, segment.end_time);
        let average_energy = mean(values).unwrap_or(0.0);
        let variation = if average_energy > 0.0 {
            sample_std(values) / average_energy
        } else {
            0.0
        };

        ProductionCycle {
            cycle_id,
            start_time: segment.start_time,
            end_time: segment.end_time,
            duration_seconds: segment.duration_seconds(),
            energy_consumption: values.iter().sum(),
            peak_energy: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            average_energy,
            variation,
        }
    }

    /// Population statistics over all cycles. Empty for an empty list.
    pub fn calculate_statistics(cycles: &[ProductionCycle]) -> CycleStatistics {
        if cycles.is_empty() {
            return CycleStatistics::default();
        }
        let column = |f: fn(&ProductionCycle) -> f64| cycles.iter().map(f).collect::<Vec<f64>>();
        let energy = column(|c| c.energy_consumption);

        CycleStatistics {
            total_cycles: cycles.len(),
            duration: summarize(&column(|c| c.duration_seconds)),
            energy: summarize(&energy),
            peak_energy: summarize(&column(|c| c.peak_energy)),
            variation: summarize(&column(|c| c.variation)),
            total_energy: Some(energy.iter().sum()),
        }
    }
}
