//! State Classification & Outlier Repair
//!
//! Labels every sample of an energy trace as off, standby or production and
//! repairs spurious readings inside the standby and production sub-series.
//!
//! ## Classification
//!
//! 1. Centered rolling median gives a dynamic threshold. The window is either
//!    a sample count (incomplete windows at the ends are filled backward then
//!    forward) or a time span (partial windows at the ends).
//! 2. `off` = value == 0 AND threshold == 0, `on` = !off.
//! 3. `standby` = on AND threshold < production_threshold, `production` = on AND !standby.
//!
//! ## Outlier repair
//!
//! For standby and production independently, values outside
//! `mean -/+ coeff * IQR` of that state's own values are marked missing and
//! re-filled by time-weighted interpolation within the state's sub-series.
//! Masks are computed once, before repair, and are never changed by it.
//! When every value of a state is flagged there is nothing to interpolate
//! from; that state's values are kept as read and a warning is raised.

use std::fmt;

use chrono::TimeDelta;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::observer::{tracing_observer, SharedObserver, Stage};
use super::statistics::{
    centered_rolling_median_until, centered_time_median_until, fill_backward_then_forward,
    interpolate_time, iqr_bounds, InterpolationError, IqrBounds,
};
use crate::types::{MachineState, SignalTable, StateDistribution, StateMasks};

// ============================================================================
// Parameters
// ============================================================================

/// Default rolling window (samples)
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Default threshold separating standby from production
pub const DEFAULT_PRODUCTION_THRESHOLD: f64 = 5.0;

/// Extent of the rolling median behind the dynamic threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingWindow {
    /// Sample count, clamped to the series length; complete windows only
    Samples(usize),
    /// Time span centered on each sample; partial windows at the ends
    Duration(TimeDelta),
}

impl RollingWindow {
    fn is_valid(self) -> bool {
        match self {
            Self::Samples(n) => n > 0,
            Self::Duration(span) => span / 2 > TimeDelta::zero(),
        }
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::Samples(DEFAULT_WINDOW_SIZE)
    }
}

impl From<usize> for RollingWindow {
    fn from(samples: usize) -> Self {
        Self::Samples(samples)
    }
}

impl From<TimeDelta> for RollingWindow {
    fn from(span: TimeDelta) -> Self {
        Self::Duration(span)
    }
}

impl fmt::Display for RollingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Samples(n) => write!(f, "{n} samples"),
            Self::Duration(span) => write!(f, "{:.3}s", span.num_milliseconds() as f64 / 1000.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationParams {
    pub window: RollingWindow,
    /// Dynamic thresholds below this value are standby, the rest production
    pub production_threshold: f64,
    /// Retain the filled dynamic threshold series after classification
    pub keep_threshold: bool,
}

impl Default for ClassificationParams {
    fn default() -> Self {
        Self {
            window: RollingWindow::default(),
            production_threshold: DEFAULT_PRODUCTION_THRESHOLD,
            keep_threshold: false,
        }
    }
}

/// IQR multipliers, one per bound per repaired state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrCoefficients {
    pub standby_lower: f64,
    pub standby_upper: f64,
    pub production_lower: f64,
    pub production_upper: f64,
}

impl Default for IqrCoefficients {
    fn default() -> Self {
        Self {
            standby_lower: 3.0,
            standby_upper: 3.0,
            production_lower: 1.5,
            production_upper: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PreprocessParams {
    pub classification: ClassificationParams,
    pub iqr: IqrCoefficients,
}

/// Acceptance ranges for the two repaired states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateBounds {
    pub standby: IqrBounds,
    pub production: IqrBounds,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ClassificationError {
    #[error("No energy data to classify")]
    EmptySignal,

    #[error("Rolling window must be positive, got {0}")]
    InvalidWindow(RollingWindow),

    #[error("Production threshold must be finite, got {0}")]
    InvalidThreshold(f64),

    #[error("Non-finite energy value {value} at index {index}")]
    NonFiniteValue { index: usize, value: f64 },

    #[error("Dynamic threshold could not be computed")]
    ThresholdUnavailable,

    #[error("Classification cancelled")]
    Cancelled,

    #[error("States must be detected before accessing state data")]
    NotClassified,

    #[error("Mask length {actual} does not match signal length {expected}")]
    MaskLengthMismatch { expected: usize, actual: usize },

    #[error("Outlier repair failed for {state}: {source}")]
    Repair {
        state: MachineState,
        #[source]
        source: InterpolationError,
    },
}

// ============================================================================
// Pure stage functions
// ============================================================================

fn check_signal(signal: &SignalTable) -> Result<(), ClassificationError> {
    if signal.is_empty() {
        return Err(ClassificationError::EmptySignal);
    }
    if let Some(index) = signal.first_non_finite() {
        return Err(ClassificationError::NonFiniteValue {
            index,
            value: signal.values()[index],
        });
    }
    Ok(())
}

/// Classify a signal. Returns the masks and the filled dynamic threshold.
pub fn classify(
    signal: &SignalTable,
    window: impl Into<RollingWindow>,
    production_threshold: f64,
) -> Result<(StateMasks, Vec<f64>), ClassificationError> {
    classify_until(signal, window.into(), production_threshold, &|| false)
}

fn classify_until(
    signal: &SignalTable,
    window: RollingWindow,
    production_threshold: f64,
    stop: &dyn Fn() -> bool,
) -> Result<(StateMasks, Vec<f64>), ClassificationError> {
    check_signal(signal)?;
    if !window.is_valid() {
        return Err(ClassificationError::InvalidWindow(window));
    }
    if !production_threshold.is_finite() {
        return Err(ClassificationError::InvalidThreshold(production_threshold));
    }

    let medians = match window {
        RollingWindow::Samples(n) => centered_rolling_median_until(signal.values(), n, stop),
        RollingWindow::Duration(span) => {
            centered_time_median_until(signal.timestamps(), signal.values(), span, stop)
        }
    }
    .ok_or(ClassificationError::Cancelled)?;
    let threshold =
        fill_backward_then_forward(&medians).ok_or(ClassificationError::ThresholdUnavailable)?;

    let off: Vec<bool> = signal
        .values()
        .iter()
        .zip(threshold.iter())
        .map(|(&value, &level)| value == 0.0 && level == 0.0)
        .collect();
    let standby_candidate: Vec<bool> = threshold
        .iter()
        .map(|&level| level < production_threshold)
        .collect();

    Ok((StateMasks::from_decisions(off, &standby_candidate), threshold))
}

/// Bounds for each repaired state, computed from the values under its mask.
pub fn state_bounds(signal: &SignalTable, masks: &StateMasks, coefficients: &IqrCoefficients) -> StateBounds {
    StateBounds {
        standby: iqr_bounds(
            signal.select(&masks.standby).values(),
            coefficients.standby_lower,
            coefficients.standby_upper,
        ),
        production: iqr_bounds(
            signal.select(&masks.production).values(),
            coefficients.production_lower,
            coefficients.production_upper,
        ),
    }
}

/// What outlier repair did to one state's sub-series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRepair {
    /// This many values were replaced (0 when nothing was flagged)
    Repaired(usize),
    /// All this many values were flagged, leaving no anchor to interpolate
    /// from; the sub-series is kept as read
    Unanchored(usize),
}

impl StateRepair {
    pub fn replaced(self) -> usize {
        match self {
            Self::Repaired(n) => n,
            Self::Unanchored(_) => 0,
        }
    }
}

/// Repaired copy of a signal with the per-state outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedSignal {
    pub signal: SignalTable,
    pub standby: StateRepair,
    pub production: StateRepair,
}

/// Repair one state's sub-series in place. An empty mask is a no-op.
fn repair_state(
    signal: &mut SignalTable,
    mask: &[bool],
    bounds: IqrBounds,
    state: MachineState,
) -> Result<StateRepair, ClassificationError> {
    if mask.len() != signal.len() {
        return Err(ClassificationError::MaskLengthMismatch {
            expected: signal.len(),
            actual: mask.len(),
        });
    }
    let positions: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
    if positions.is_empty() {
        return Ok(StateRepair::Repaired(0));
    }

    let timestamps: Vec<_> = positions.iter().map(|&i| signal.timestamps()[i]).collect();
    let mut values: Vec<f64> = positions.iter().map(|&i| signal.values()[i]).collect();

    let mut flagged = 0;
    for v in &mut values {
        if bounds.is_outlier(*v) {
            *v = f64::NAN;
            flagged += 1;
        }
    }
    if flagged == 0 {
        return Ok(StateRepair::Repaired(0));
    }

    match interpolate_time(&timestamps, &mut values) {
        Ok(()) => {}
        // A flat sub-series collapses its IQR to zero and flags itself entirely
        Err(InterpolationError::NoAnchor(count)) => return Ok(StateRepair::Unanchored(count)),
        Err(source) => return Err(ClassificationError::Repair { state, source }),
    }

    let target = signal.values_mut();
    for (&i, v) in positions.iter().zip(values) {
        target[i] = v;
    }
    Ok(StateRepair::Repaired(flagged))
}

/// Repair standby and production outliers, returning a new table.
///
/// The input is never modified; on error no partially repaired table escapes.
pub fn repair(
    signal: &SignalTable,
    masks: &StateMasks,
    bounds: &StateBounds,
) -> Result<RepairedSignal, ClassificationError> {
    let mut repaired = signal.clone();
    let standby = repair_state(&mut repaired, &masks.standby, bounds.standby, MachineState::Standby)?;
    let production =
        repair_state(&mut repaired, &masks.production, bounds.production, MachineState::Production)?;
    Ok(RepairedSignal {
        signal: repaired,
        standby,
        production,
    })
}

// ============================================================================
// Classifier
// ============================================================================

/// Owns a private working copy of the signal for the duration of processing.
pub struct StateClassifier {
    signal: SignalTable,
    masks: Option<StateMasks>,
    distribution: StateDistribution,
    dynamic_threshold: Option<Vec<f64>>,
    observer: SharedObserver,
    cancel: CancellationToken,
}

impl StateClassifier {
    pub fn new(signal: &SignalTable) -> Self {
        Self::with_observer(signal, tracing_observer())
    }

    pub fn with_observer(signal: &SignalTable, observer: SharedObserver) -> Self {
        Self {
            signal: signal.clone(),
            masks: None,
            distribution: StateDistribution::default(),
            dynamic_threshold: None,
            observer,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop classification early once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Detect machine states on the working copy.
    pub fn detect_states(
        &mut self,
        params: &ClassificationParams,
    ) -> Result<&StateMasks, ClassificationError> {
        self.observer.stage_started(Stage::StateClassification);
        let cancel = &self.cancel;
        let classified = classify_until(
            &self.signal,
            params.window,
            params.production_threshold,
            &|| cancel.is_cancelled(),
        );
        let (masks, threshold) = match classified {
            Ok(result) => result,
            Err(e) => {
                self.observer
                    .stage_failed(Stage::StateClassification, &e.to_string());
                return Err(e);
            }
        };

        self.distribution = masks.distribution();
        self.dynamic_threshold = params.keep_threshold.then_some(threshold);
        self.observer.stage_completed(
            Stage::StateClassification,
            &format!(
                "{} samples: {} off, {} standby, {} production",
                masks.len(),
                self.distribution.count(MachineState::Off),
                self.distribution.count(MachineState::Standby),
                self.distribution.count(MachineState::Production),
            ),
        );
        Ok(self.masks.insert(masks))
    }

    /// IQR bounds of the working values under `mask`. NaN bounds for an empty mask.
    pub fn state_limits(
        &self,
        mask: &[bool],
        lower_coefficient: f64,
        upper_coefficient: f64,
    ) -> Result<IqrBounds, ClassificationError> {
        if mask.len() != self.signal.len() {
            return Err(ClassificationError::MaskLengthMismatch {
                expected: self.signal.len(),
                actual: mask.len(),
            });
        }
        Ok(iqr_bounds(
            self.signal.select(mask).values(),
            lower_coefficient,
            upper_coefficient,
        ))
    }

    /// Repair outliers under `state`'s mask directly in the working copy.
    pub fn remove_outliers(
        &mut self,
        state: MachineState,
        bounds: IqrBounds,
    ) -> Result<StateRepair, ClassificationError> {
        let mask = self
            .masks
            .as_ref()
            .ok_or(ClassificationError::NotClassified)?
            .mask(state)
            .to_vec();
        repair_state(&mut self.signal, &mask, bounds, state)
    }

    /// Classify, then repair standby and production outliers.
    ///
    /// Input contract violations are returned as `Err`. A repair fault
    /// returns `Ok(false)` and leaves the working copy as classification left
    /// it; callers must not trust the masks or signal in that case. A state
    /// with no anchor left after flagging is not a fault: it keeps its values
    /// and is reported through `stage_warning`.
    pub fn preprocess(&mut self, params: &PreprocessParams) -> Result<bool, ClassificationError> {
        self.detect_states(&params.classification)?;
        let Some(masks) = self.masks.as_ref() else {
            return Err(ClassificationError::NotClassified);
        };

        self.observer.stage_started(Stage::OutlierRepair);
        let bounds = state_bounds(&self.signal, masks, &params.iqr);
        match repair(&self.signal, masks, &bounds) {
            Ok(repaired) => {
                for (state, outcome) in [
                    (MachineState::Standby, repaired.standby),
                    (MachineState::Production, repaired.production),
                ] {
                    if let StateRepair::Unanchored(count) = outcome {
                        self.observer.stage_warning(
                            Stage::OutlierRepair,
                            &format!("all {count} {state} values fall outside their bounds; kept unrepaired"),
                        );
                    }
                }
                let changed = repaired.standby.replaced() + repaired.production.replaced();
                self.signal = repaired.signal;
                self.observer.stage_completed(
                    Stage::OutlierRepair,
                    &format!("{changed} values repaired"),
                );
                Ok(true)
            }
            Err(e) => {
                self.observer.stage_failed(Stage::OutlierRepair, &e.to_string());
                Ok(false)
            }
        }
    }

    pub fn is_processed(&self) -> bool {
        self.masks.is_some()
    }

    pub fn state_masks(&self) -> Option<&StateMasks> {
        self.masks.as_ref()
    }

    /// Sample count per final label (empty before classification).
    pub fn state_distribution(&self) -> &StateDistribution {
        &self.distribution
    }

    /// Filled dynamic threshold, when retained via `keep_threshold`.
    pub fn dynamic_threshold(&self) -> Option<&[f64]> {
        self.dynamic_threshold.as_deref()
    }

    pub fn processed_data(&self) -> &SignalTable {
        &self.signal
    }

    /// Samples of the processed signal in `state`.
    pub fn state_data(&self, state: MachineState) -> Result<SignalTable, ClassificationError> {
        let masks = self.masks.as_ref().ok_or(ClassificationError::NotClassified)?;
        Ok(self.signal.select(masks.mask(state)))
    }

    pub fn into_parts(self) -> (SignalTable, Option<StateMasks>) {
        (self.signal, self.masks)
    }
}
