//! Pipeline Integration Tests
//!
//! Drives classification, segmentation, scoring and report generation
//! through the public API on a synthetic trace with one short cycle.

use chrono::{TimeDelta, TimeZone, Utc};
use machine_analyzer::analysis::{
    noop_observer, ClassificationParams, PipelineObserver, PreprocessParams, RollingWindow, Stage,
};
use machine_analyzer::reporting::ReportGenerator;
use machine_analyzer::{
    run_pipeline, run_with_deadline, AnalyzerConfig, MachineState, PipelineError, PipelineParams,
    SignalTable, ThresholdFactors,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Six production bursts separated by idle zeros; the third is short.
fn shift_trace() -> SignalTable {
    let mut values = vec![0.0; 10];
    for burst in [21, 21, 7, 21, 21, 21] {
        values.extend((0..burst).map(|i| 40.0 + f64::from(i % 3)));
        values.extend([0.0; 10]);
    }
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
    SignalTable::uniform("value", start, TimeDelta::seconds(1), values).unwrap()
}

fn params() -> PipelineParams {
    PipelineParams {
        preprocess: PreprocessParams {
            classification: ClassificationParams {
                window: RollingWindow::Samples(3),
                production_threshold: 10.0,
                keep_threshold: false,
            },
            ..PreprocessParams::default()
        },
        min_duration_secs: 5.0,
        max_duration_secs: 60.0,
        factors: ThresholdFactors::default(),
    }
}

#[derive(Default)]
struct CountingObserver {
    started: AtomicUsize,
    completed: AtomicUsize,
    skipped: AtomicUsize,
}

impl PipelineObserver for CountingObserver {
    fn stage_started(&self, _stage: Stage) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn stage_completed(&self, _stage: Stage, _detail: &str) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn unit_skipped(&self, _stage: Stage, _unit_id: usize, _reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Analysis
// ============================================================================

#[test]
fn short_cycle_is_the_only_anomaly() {
    let outcome = run_pipeline(&shift_trace(), &params(), noop_observer()).unwrap();

    assert_eq!(outcome.cycles.len(), 6);
    let ids: Vec<usize> = outcome.cycles.iter().map(|c| c.cycle_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(outcome.cycles[0].duration_seconds, 20.0);
    assert_eq!(outcome.cycles[2].duration_seconds, 6.0);

    assert_eq!(outcome.anomalous_units(), &[2]);
    let short = &outcome.quality.metrics[2];
    assert!(short.is_anomalous);
    assert!(short.issues.iter().any(|i| i == "Duration is too short"));
    assert!(short.quality_score < 1.0);

    let summary = outcome.quality.summary.as_ref().unwrap();
    assert_eq!(summary.total_cycles, 6);
    assert_eq!(summary.anomalous_cycles, 1);
}

#[test]
fn masks_partition_every_sample() {
    let signal = shift_trace();
    let outcome = run_pipeline(&signal, &params(), noop_observer()).unwrap();

    assert!(outcome.masks.is_partition());
    assert_eq!(outcome.masks.len(), signal.len());
    let production: usize = [21, 21, 7, 21, 21, 21].iter().sum();
    assert_eq!(outcome.distribution.count(MachineState::Production), production);
    assert_eq!(outcome.distribution.count(MachineState::Off), signal.len() - production);
    assert_eq!(outcome.distribution.count(MachineState::Standby), 0);
}

#[test]
fn observer_sees_every_stage() {
    let observer = Arc::new(CountingObserver::default());
    run_pipeline(&shift_trace(), &params(), observer.clone()).unwrap();

    assert_eq!(observer.started.load(Ordering::SeqCst), 4);
    assert_eq!(observer.completed.load(Ordering::SeqCst), 4);
    assert_eq!(observer.skipped.load(Ordering::SeqCst), 0);
}

#[test]
fn all_off_signal_yields_empty_results() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let idle = SignalTable::uniform("value", start, TimeDelta::seconds(1), vec![0.0; 50]).unwrap();
    let outcome = run_pipeline(&idle, &params(), noop_observer()).unwrap();

    assert!(outcome.cycles.is_empty());
    assert!(outcome.statistics.is_empty());
    assert!(outcome.quality.metrics.is_empty());
    assert!(outcome.quality.summary.is_none());
    assert!(outcome.anomalous_units().is_empty());
    assert_eq!(serde_json::to_value(&outcome.statistics).unwrap(), serde_json::json!({}));
}

#[test]
fn time_window_from_config_matches_sample_window() {
    // On 1 s spacing a 3 s span covers the same samples as a 3-sample window
    let config = AnalyzerConfig::from_toml_str(
        "[state_detection]\nwindow_secs = 3.0\nproduction_threshold = 10.0\n\
         [segmentation]\nmin_duration_secs = 5.0\nmax_duration_secs = 60.0\n",
    )
    .unwrap();
    let by_time = run_pipeline(&shift_trace(), &config.pipeline_params(), noop_observer()).unwrap();
    let by_count = run_pipeline(&shift_trace(), &params(), noop_observer()).unwrap();

    assert_eq!(by_time.cycles.len(), 6);
    assert_eq!(by_time.masks.production, by_count.masks.production);
    assert_eq!(by_time.anomalous_units(), &[2]);
}

#[test]
fn inverted_duration_range_is_rejected() {
    let mut bad = params();
    bad.min_duration_secs = 100.0;
    bad.max_duration_secs = 10.0;
    let err = run_pipeline(&shift_trace(), &bad, noop_observer()).unwrap_err();
    assert!(matches!(err, PipelineError::Segmentation(_)));
}

// ============================================================================
// Deadline
// ============================================================================

#[tokio::test]
async fn deadline_run_matches_direct_run() {
    let direct = run_pipeline(&shift_trace(), &params(), noop_observer()).unwrap();
    let bounded = run_with_deadline(
        shift_trace(),
        params(),
        noop_observer(),
        Some(Duration::from_secs(30)),
    )
    .await
    .unwrap();

    assert_eq!(bounded.cycles, direct.cycles);
    assert_eq!(bounded.quality, direct.quality);
}

#[tokio::test]
async fn zero_deadline_is_exceeded() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let values: Vec<f64> = (0..500_000).map(|i| f64::from(i % 100)).collect();
    let large = SignalTable::uniform("value", start, TimeDelta::seconds(1), values).unwrap();

    let err = run_with_deadline(large, PipelineParams::default(), noop_observer(), Some(Duration::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::DeadlineExceeded(_)));
}

#[test]
fn runtime_shuts_down_promptly_after_deadline() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let values: Vec<f64> = (0..400_000).map(|i| f64::from(i % 997)).collect();
    let large = SignalTable::uniform("value", start, TimeDelta::seconds(1), values).unwrap();
    let mut slow = PipelineParams::default();
    slow.preprocess.classification.window = RollingWindow::Samples(20_001);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let started = Instant::now();
    let err = runtime
        .block_on(run_with_deadline(
            large,
            slow,
            noop_observer(),
            Some(Duration::from_millis(100)),
        ))
        .unwrap_err();
    // Dropping the runtime waits for blocking workers still running
    drop(runtime);
    let elapsed = started.elapsed();

    assert!(matches!(err, PipelineError::DeadlineExceeded(_)));
    assert!(elapsed < Duration::from_secs(2), "runtime shutdown took {elapsed:?}");
}

// ============================================================================
// Reports
// ============================================================================

#[test]
fn reports_are_written_to_output_dir() {
    let outcome = run_pipeline(&shift_trace(), &params(), noop_observer()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let stamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();

    let generator = ReportGenerator::new(dir.path().join("reports"), "press-7")
        .unwrap()
        .with_generated_at(stamp);
    let paths = generator.generate_all(&outcome, true, true, true).unwrap();

    let text_path = paths.text.unwrap();
    assert!(text_path.ends_with("machine_analysis_report_20240101_123000.txt"));
    let text = std::fs::read_to_string(text_path).unwrap();
    assert!(text.contains("Total Production Cycles: 6"));
    assert!(text.contains("Found 1 anomalous units:"));
    assert!(text.contains("  Cycle ID: 2"));
    assert!(text.contains("High anomalous unit rate detected."));

    let csv = std::fs::read_to_string(paths.csv.unwrap()).unwrap();
    assert_eq!(csv.lines().count(), 7);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(paths.json.unwrap()).unwrap()).unwrap();
    assert_eq!(json["machine"], "press-7");
    assert_eq!(json["production_summary"]["total_cycles"], 6);
    assert_eq!(json["production_summary"]["anomalous_units"], 1);

    // No temp files left behind
    let leftovers = std::fs::read_dir(dir.path().join("reports"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn disabled_reports_are_skipped() {
    let outcome = run_pipeline(&shift_trace(), &params(), noop_observer()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let generator = ReportGenerator::new(dir.path(), "m").unwrap();
    let paths = generator.generate_all(&outcome, false, true, false).unwrap();

    assert!(paths.text.is_none());
    assert!(paths.csv.is_some());
    assert!(paths.json.is_none());
}
