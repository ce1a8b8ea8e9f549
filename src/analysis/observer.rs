//! Pipeline observability hooks
//!
//! The analysis stages report progress through a `PipelineObserver` handed
//! to them at construction instead of logging directly, so the core can run
//! silently in tests and be wired to `tracing` in the binaries.

use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Stage of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    StateClassification,
    OutlierRepair,
    CycleSegmentation,
    QualityScoring,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StateClassification => "state classification",
            Self::OutlierRepair => "outlier repair",
            Self::CycleSegmentation => "cycle segmentation",
            Self::QualityScoring => "quality scoring",
        };
        f.write_str(name)
    }
}

/// Receives stage-boundary and failure notifications. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}

    fn stage_completed(&self, _stage: Stage, _detail: &str) {}

    /// One unit of work (a cycle) was dropped from the batch.
    fn unit_skipped(&self, _stage: Stage, _unit_id: usize, _reason: &str) {}

    /// The stage carried on, but part of its work was left undone.
    fn stage_warning(&self, _stage: Stage, _message: &str) {}

    fn stage_failed(&self, _stage: Stage, _reason: &str) {}
}

pub type SharedObserver = Arc<dyn PipelineObserver>;

/// Silent observer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Forwards notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn stage_started(&self, stage: Stage) {
        tracing::debug!(%stage, "Stage started");
    }

    fn stage_completed(&self, stage: Stage, detail: &str) {
        info!(%stage, detail, "Stage completed");
    }

    fn unit_skipped(&self, stage: Stage, unit_id: usize, reason: &str) {
        warn!(%stage, unit_id, reason, "Unit skipped");
    }

    fn stage_warning(&self, stage: Stage, message: &str) {
        warn!(%stage, message, "Stage warning");
    }

    fn stage_failed(&self, stage: Stage, reason: &str) {
        error!(%stage, reason, "Stage failed");
    }
}

pub fn tracing_observer() -> SharedObserver {
    Arc::new(TracingObserver)
}

pub fn noop_observer() -> SharedObserver {
    Arc::new(NoopObserver)
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Collects every notification as a formatted line.
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }

        fn push(&self, line: String) {
            if let Ok(mut events) = self.events.lock() {
                events.push(line);
            }
        }
    }

    impl PipelineObserver for RecordingObserver {
        fn stage_started(&self, stage: Stage) {
            self.push(format!("started {stage}"));
        }

        fn stage_completed(&self, stage: Stage, detail: &str) {
            self.push(format!("completed {stage}: {detail}"));
        }

        fn unit_skipped(&self, stage: Stage, unit_id: usize, reason: &str) {
            self.push(format!("skipped {stage} #{unit_id}: {reason}"));
        }

        fn stage_warning(&self, stage: Stage, message: &str) {
            self.push(format!("warning {stage}: {message}"));
        }

        fn stage_failed(&self, stage: Stage, reason: &str) {
            self.push(format!("failed {stage}: {reason}"));
        }
    }
}
