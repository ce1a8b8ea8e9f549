//! Quality scoring types: per-cycle metrics, grades and the run summary

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Letter grade derived from the quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityGrade {
    A,
    B,
    C,
    D,
}

impl QualityGrade {
    /// Lower bounds are inclusive: `>= 0.8` A, `>= 0.6` B, `>= 0.4` C, else D.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.8 => Self::A,
            s if s >= 0.6 => Self::B,
            s if s >= 0.4 => Self::C,
            _ => Self::D,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sigma multipliers for the three anomaly rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdFactors {
    pub variation: f64,
    pub duration: f64,
    pub energy: f64,
}

impl Default for ThresholdFactors {
    fn default() -> Self {
        Self {
            variation: 2.0,
            duration: 2.0,
            energy: 2.0,
        }
    }
}

/// Quality assessment of one production cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub cycle_id: usize,
    /// `1 - anomaly_count / 3`, always within [0, 1]
    pub quality_score: f64,
    pub quality_grade: QualityGrade,
    pub is_anomalous: bool,
    /// Rule messages in evaluation order
    pub issues: Vec<String>,
}

/// Run-level roll-up of the per-cycle metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub total_cycles: usize,
    pub anomalous_cycles: usize,
    pub average_quality_score: f64,
    pub quality_grade_distribution: BTreeMap<QualityGrade, usize>,
}

/// Everything one scoring pass produces.
///
/// `summary` is `None` when there was nothing to score, which is different
/// from a summary where every cycle passed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub metrics: Vec<QualityMetrics>,
    pub anomalous_units: Vec<usize>,
    pub summary: Option<QualitySummary>,
}
