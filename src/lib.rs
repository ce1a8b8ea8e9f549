//! Machine Analyzer: Energy-based production analysis
//!
//! Turns a machine's energy-consumption time series into production cycles
//! with quality scores.
//!
//! ## Architecture
//!
//! - **Acquisition**: CSV / JSON / text loading, resampling, gap filling
//! - **State Classifier**: Off / Standby / Production labels from a rolling-median threshold, IQR outlier repair
//! - **Cycle Segmenter**: Contiguous production runs filtered by duration, per-cycle metrics
//! - **Quality Scorer**: Sigma rules against the run's population statistics
//! - **Reporting**: Text report, per-cycle CSV, JSON summary

pub mod acquisition;
pub mod analysis;
pub mod config;
pub mod reporting;
pub mod types;

// Re-export configuration
pub use config::AnalyzerConfig;

// Re-export commonly used types
pub use types::{
    CycleStatistics, EnergySummary, MachineState, ProductionCycle, QualityGrade, QualityMetrics,
    QualityReport, SignalTable, StateDistribution, StateMasks, ThresholdFactors,
};

// Re-export the analysis stages
pub use analysis::{
    run_pipeline, run_with_deadline, AnalysisOutcome, CycleSegmenter, PipelineError,
    PipelineObserver, PipelineParams, QualityScorer, RollingWindow, StateClassifier,
};

// Re-export acquisition and reporting entry points
pub use acquisition::{load_signal, load_signal_auto, preprocess, validate_data, LoadOptions};
pub use reporting::{ReportGenerator, ReportPaths};
