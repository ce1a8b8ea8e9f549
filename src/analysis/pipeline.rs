//! End-to-end analysis run
//!
//! ```text
//! SignalTable ─► StateClassifier ─► CycleSegmenter ─► QualityScorer ─► AnalysisOutcome
//!                (masks + repair)    (cycles + stats)   (metrics + summary)
//! ```
//!
//! Each stage consumes the complete output of the previous one. The run is
//! synchronous; `run_with_deadline` moves it onto a blocking worker and
//! bounds it with a timeout. When the deadline passes the worker is
//! cancelled and stops at its next check, so a runtime shutting down right
//! after does not wait for the abandoned analysis.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::cycle_segmenter::{
    CycleSegmenter, SegmentationError, DEFAULT_MAX_DURATION_SECS, DEFAULT_MIN_DURATION_SECS,
};
use super::observer::SharedObserver;
use super::quality_scorer::QualityScorer;
use super::state_classifier::{ClassificationError, PreprocessParams, StateClassifier};
use crate::types::{
    CycleStatistics, ProductionCycle, QualityReport, SignalTable, StateDistribution, StateMasks,
    ThresholdFactors,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("State classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Cycle segmentation failed: {0}")]
    Segmentation(#[from] SegmentationError),

    #[error("Outlier repair failed; masks and signal are not trustworthy")]
    RepairFailed,

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Analysis did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Analysis worker stopped unexpectedly: {0}")]
    Worker(String),
}

/// Parameters for one full run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineParams {
    pub preprocess: PreprocessParams,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub factors: ThresholdFactors,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            preprocess: PreprocessParams::default(),
            min_duration_secs: DEFAULT_MIN_DURATION_SECS,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            factors: ThresholdFactors::default(),
        }
    }
}

/// Everything a run hands to the report layer.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    /// Signal after outlier repair
    pub processed_signal: SignalTable,
    pub masks: StateMasks,
    pub distribution: StateDistribution,
    /// Present only when `keep_threshold` was requested
    pub dynamic_threshold: Option<Vec<f64>>,
    pub cycles: Vec<ProductionCycle>,
    pub statistics: CycleStatistics,
    pub quality: QualityReport,
}

impl AnalysisOutcome {
    pub fn anomalous_units(&self) -> &[usize] {
        &self.quality.anomalous_units
    }
}

/// Run classification, repair, segmentation and scoring over `signal`.
pub fn run_pipeline(
    signal: &SignalTable,
    params: &PipelineParams,
    observer: SharedObserver,
) -> Result<AnalysisOutcome, PipelineError> {
    run_pipeline_cancellable(signal, params, observer, &CancellationToken::new())
}

/// [`run_pipeline`] that returns `Cancelled` once `cancel` fires.
///
/// The token is checked between stages and at every sample of the rolling
/// median.
pub fn run_pipeline_cancellable(
    signal: &SignalTable,
    params: &PipelineParams,
    observer: SharedObserver,
    cancel: &CancellationToken,
) -> Result<AnalysisOutcome, PipelineError> {
    let checkpoint = || {
        if cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    };

    // Built first so an inverted duration range fails before any work
    let segmenter = CycleSegmenter::with_observer(
        params.min_duration_secs,
        params.max_duration_secs,
        observer.clone(),
    )?;
    let scorer = QualityScorer::with_observer(params.factors, observer.clone());

    checkpoint()?;
    let mut classifier =
        StateClassifier::with_observer(signal, observer).with_cancellation(cancel.clone());
    match classifier.preprocess(&params.preprocess) {
        Ok(true) => {}
        Ok(false) => return Err(PipelineError::RepairFailed),
        Err(ClassificationError::Cancelled) => return Err(PipelineError::Cancelled),
        Err(e) => return Err(e.into()),
    }
    let distribution = classifier.state_distribution().clone();
    let dynamic_threshold = classifier.dynamic_threshold().map(<[f64]>::to_vec);
    let (processed_signal, masks) = classifier.into_parts();
    let masks = masks.ok_or(ClassificationError::NotClassified)?;

    checkpoint()?;
    let (cycles, statistics) = segmenter.segment(&processed_signal, &masks.production)?;
    checkpoint()?;
    let quality = scorer.score(&cycles, &statistics);

    Ok(AnalysisOutcome {
        processed_signal,
        masks,
        distribution,
        dynamic_threshold,
        cycles,
        statistics,
        quality,
    })
}

/// Run the pipeline on a blocking worker, optionally bounded by `deadline`.
///
/// On timeout, or when this future is dropped, the worker is cancelled and
/// its result discarded.
pub async fn run_with_deadline(
    signal: SignalTable,
    params: PipelineParams,
    observer: SharedObserver,
    deadline: Option<Duration>,
) -> Result<AnalysisOutcome, PipelineError> {
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let worker = tokio::task::spawn_blocking(move || {
        run_pipeline_cancellable(&signal, &params, observer, &worker_cancel)
    });
    let _stop_worker = cancel.drop_guard();

    let joined = match deadline {
        Some(limit) => tokio::time::timeout(limit, worker)
            .await
            .map_err(|_| PipelineError::DeadlineExceeded(limit))?,
        None => worker.await,
    };
    joined.map_err(|e| PipelineError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::observer::{noop_observer, recording::RecordingObserver};
    use crate::analysis::state_classifier::{ClassificationParams, RollingWindow};
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::Arc;

    /// Idle at zero, then three production bursts of varying length.
    fn machine_trace() -> SignalTable {
        let mut values = vec![0.0; 10];
        for burst in [12, 15, 4] {
            values.extend((0..burst).map(|i| 40.0 + f64::from(i % 3)));
            values.extend([0.0; 10]);
        }
        let start = Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap();
        SignalTable::uniform("power", start, TimeDelta::seconds(1), values).unwrap()
    }

    fn params() -> PipelineParams {
        PipelineParams {
            preprocess: PreprocessParams {
                classification: ClassificationParams {
                    window: RollingWindow::Samples(3),
                    production_threshold: 10.0,
                    keep_threshold: true,
                },
                ..PreprocessParams::default()
            },
            min_duration_secs: 5.0,
            max_duration_secs: 60.0,
            factors: ThresholdFactors::default(),
        }
    }

    #[test]
    fn test_full_run() {
        let recorder = Arc::new(RecordingObserver::default());
        let outcome = run_pipeline(&machine_trace(), &params(), recorder.clone()).unwrap();

        // The 4-sample burst lasts 3 seconds and is filtered out
        assert_eq!(outcome.cycles.len(), 2);
        assert_eq!(outcome.statistics.total_cycles, 2);
        assert_eq!(outcome.quality.metrics.len(), 2);
        assert!(outcome.masks.is_partition());
        assert_eq!(outcome.distribution.total(), outcome.processed_signal.len());
        assert!(outcome.dynamic_threshold.is_some());

        let events = recorder.events();
        let started: Vec<&String> = events.iter().filter(|e| e.starts_with("started")).collect();
        assert_eq!(started.len(), 4);
    }

    #[test]
    fn test_no_production_gives_empty_quality() {
        let start = Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap();
        let idle = SignalTable::uniform("power", start, TimeDelta::seconds(1), vec![0.0; 20]).unwrap();
        let outcome = run_pipeline(&idle, &params(), noop_observer()).unwrap();

        assert!(outcome.cycles.is_empty());
        assert!(outcome.statistics.is_empty());
        assert!(outcome.anomalous_units().is_empty());
        assert!(outcome.quality.summary.is_none());
    }

    #[test]
    fn test_inverted_duration_range_fails_first() {
        let mut p = params();
        p.min_duration_secs = 100.0;
        p.max_duration_secs = 1.0;
        let recorder = Arc::new(RecordingObserver::default());
        let err = run_pipeline(&machine_trace(), &p, recorder.clone()).unwrap_err();
        assert!(matches!(err, PipelineError::Segmentation(_)));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_empty_signal_is_reported() {
        let empty = SignalTable::new("power", Vec::new(), Vec::new()).unwrap();
        let err = run_pipeline(&empty, &params(), noop_observer()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Classification(ClassificationError::EmptySignal)
        ));
    }

    #[test]
    fn test_cancelled_run_does_no_work() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let recorder = Arc::new(RecordingObserver::default());
        let err = run_pipeline_cancellable(&machine_trace(), &params(), recorder.clone(), &cancel)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_flat_standby_still_yields_cycles() {
        // Constant standby draw with a zero dip while on: the standby IQR is 0
        let mut values = vec![0.0; 30];
        for _ in 0..3 {
            values.extend([2.0; 60]);
            values.extend((0..40).map(|i| 40.0 + f64::from(i % 3)));
            values.extend([2.0; 20]);
            values.extend([0.0; 30]);
        }
        values[60] = 0.0;
        let start = Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap();
        let trace = SignalTable::uniform("power", start, TimeDelta::seconds(1), values).unwrap();

        let recorder = Arc::new(RecordingObserver::default());
        let outcome = run_pipeline(&trace, &PipelineParams::default(), recorder.clone()).unwrap();

        assert_eq!(outcome.cycles.len(), 3);
        assert!(outcome.masks.standby[60]);
        // Standby is kept exactly as read
        for (i, &v) in trace.values().iter().enumerate() {
            if outcome.masks.standby[i] {
                assert_eq!(outcome.processed_signal.values()[i], v);
            }
        }
        assert!(recorder
            .events()
            .iter()
            .any(|e| e.starts_with("warning outlier repair")));
    }

    #[tokio::test]
    async fn test_run_with_deadline_completes() {
        let outcome = run_with_deadline(
            machine_trace(),
            params(),
            noop_observer(),
            Some(Duration::from_secs(30)),
        )
        .await
        .unwrap();
        assert_eq!(outcome.cycles.len(), 2);
    }
}
