//! Report generation
//!
//! Writes the results of one analysis run to an output directory:
//!
//! - `machine_analysis_report_<stamp>.txt`: human-readable summary
//! - `cycle_quality_report_<stamp>.csv`: one row per production cycle
//! - `summary_statistics_<stamp>.json`: machine-readable roll-up
//!
//! Rendering is pure (`render_*` functions); `ReportGenerator` only adds file
//! naming and atomic writes.

mod csv;
mod summary;
mod text;

pub use self::csv::render_csv_report;
pub use summary::{DataPeriod, ProductionSummary, SummaryStatistics};
pub use text::{recommendations, render_text_report};

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::analysis::AnalysisOutcome;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to create report directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write report {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which report files a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportPaths {
    pub text: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

/// Writes report files stamped with a single generation time.
pub struct ReportGenerator {
    output_dir: PathBuf,
    machine_name: String,
    generated_at: DateTime<Utc>,
}

impl ReportGenerator {
    /// Create the generator, creating `output_dir` if needed.
    pub fn new(output_dir: impl Into<PathBuf>, machine_name: impl Into<String>) -> Result<Self, ReportError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|source| ReportError::CreateDir {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self {
            output_dir,
            machine_name: machine_name.into(),
            generated_at: Utc::now(),
        })
    }

    /// Fix the generation time (file stamps and report headers).
    pub fn with_generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, prefix: &str, extension: &str) -> PathBuf {
        let stamp = self.generated_at.format("%Y%m%d_%H%M%S");
        self.output_dir.join(format!("{prefix}_{stamp}.{extension}"))
    }

    /// Write to a temp file alongside the target, then rename.
    fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, contents)
            .and_then(|()| std::fs::rename(&tmp_path, path))
            .map_err(|source| ReportError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn generate_text_report(&self, outcome: &AnalysisOutcome) -> Result<PathBuf, ReportError> {
        let path = self.path_for("machine_analysis_report", "txt");
        let content = render_text_report(&self.machine_name, outcome, self.generated_at);
        Self::write_atomic(&path, content.as_bytes())?;
        info!(path = %path.display(), "Generated text report");
        Ok(path)
    }

    pub fn generate_csv_report(&self, outcome: &AnalysisOutcome) -> Result<PathBuf, ReportError> {
        let path = self.path_for("cycle_quality_report", "csv");
        let content = render_csv_report(&outcome.cycles, &outcome.quality.metrics);
        Self::write_atomic(&path, content.as_bytes())?;
        info!(path = %path.display(), cycles = outcome.cycles.len(), "Generated CSV report");
        Ok(path)
    }

    pub fn summary_statistics(&self, outcome: &AnalysisOutcome) -> SummaryStatistics {
        SummaryStatistics::from_outcome(&self.machine_name, outcome, self.generated_at)
    }

    pub fn generate_json_summary(&self, outcome: &AnalysisOutcome) -> Result<PathBuf, ReportError> {
        let path = self.path_for("summary_statistics", "json");
        let json = serde_json::to_vec_pretty(&self.summary_statistics(outcome))?;
        Self::write_atomic(&path, &json)?;
        info!(path = %path.display(), "Generated JSON summary");
        Ok(path)
    }

    /// Write the selected reports.
    pub fn generate_all(
        &self,
        outcome: &AnalysisOutcome,
        text: bool,
        csv: bool,
        json: bool,
    ) -> Result<ReportPaths, ReportError> {
        Ok(ReportPaths {
            text: text.then(|| self.generate_text_report(outcome)).transpose()?,
            csv: csv.then(|| self.generate_csv_report(outcome)).transpose()?,
            json: json.then(|| self.generate_json_summary(outcome)).transpose()?,
        })
    }
}
