//! Energy Signal Analysis
//!
//! ## Stages
//!
//! - **StateClassifier**: off / standby / production masks and IQR outlier repair
//! - **CycleSegmenter**: production runs filtered by duration, with population statistics
//! - **QualityScorer**: sigma-rule anomaly checks, scores and grades
//!
//! The stages report progress through an injected `PipelineObserver`.

pub mod cycle_segmenter;
pub mod observer;
pub mod pipeline;
pub mod quality_scorer;
pub mod state_classifier;
pub mod statistics;

pub use cycle_segmenter::{CycleSegmenter, ProductionSegment, SegmentationError};
pub use observer::{
    noop_observer, tracing_observer, NoopObserver, PipelineObserver, SharedObserver, Stage,
    TracingObserver,
};
pub use pipeline::{
    run_pipeline, run_pipeline_cancellable, run_with_deadline, AnalysisOutcome, PipelineError,
    PipelineParams,
};
pub use quality_scorer::{QualityRule, QualityScorer, RuleError};
pub use state_classifier::{
    ClassificationError, ClassificationParams, IqrCoefficients, PreprocessParams, RepairedSignal,
    RollingWindow, StateBounds, StateClassifier, StateRepair,
};
pub use statistics::IqrBounds;
