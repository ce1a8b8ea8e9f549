//! Cycle Quality Scoring
//!
//! Scores every production cycle against the population statistics of its
//! run with three sigma rules:
//!
//! - variation too high: `variation > mean + k_v * std`
//! - duration too short: `duration < mean - k_d * std`
//! - energy too high: `energy > mean + k_e * std`
//!
//! `quality_score = 1 - triggered / 3`. A rule whose population statistics
//! are missing is skipped. A cycle whose rules cannot be evaluated is dropped
//! from the batch and reported to the observer; scoring continues.

use std::collections::BTreeMap;
use thiserror::Error;

use super::observer::{tracing_observer, SharedObserver, Stage};
use crate::types::{
    CycleStatistics, MetricSummary, ProductionCycle, QualityGrade, QualityMetrics, QualityReport,
    QualitySummary, ThresholdFactors,
};

/// Number of rules a cycle is checked against
pub const RULE_COUNT: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("{rule} check got non-finite cycle value {value}")]
    NonFiniteMetric { rule: QualityRule, value: f64 },

    #[error("{rule} check got non-finite limit {limit}")]
    NonFiniteLimit { rule: QualityRule, limit: f64 },
}

/// The three anomaly rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityRule {
    VariationTooHigh,
    DurationTooShort,
    EnergyTooHigh,
}

impl QualityRule {
    pub const ALL: [QualityRule; RULE_COUNT] = [
        Self::VariationTooHigh,
        Self::DurationTooShort,
        Self::EnergyTooHigh,
    ];

    /// Text appended to a cycle's issues when the rule triggers.
    pub const fn message(self) -> &'static str {
        match self {
            Self::VariationTooHigh => "Variation is too high",
            Self::DurationTooShort => "Duration is too short",
            Self::EnergyTooHigh => "Energy consumption is too high",
        }
    }

    fn cycle_value(self, cycle: &ProductionCycle) -> f64 {
        match self {
            Self::VariationTooHigh => cycle.variation,
            Self::DurationTooShort => cycle.duration_seconds,
            Self::EnergyTooHigh => cycle.energy_consumption,
        }
    }

    fn population(self, stats: &CycleStatistics) -> Option<&MetricSummary> {
        match self {
            Self::VariationTooHigh => stats.variation.as_ref(),
            Self::DurationTooShort => stats.duration.as_ref(),
            Self::EnergyTooHigh => stats.energy.as_ref(),
        }
    }

    fn factor(self, factors: &ThresholdFactors) -> f64 {
        match self {
            Self::VariationTooHigh => factors.variation,
            Self::DurationTooShort => factors.duration,
            Self::EnergyTooHigh => factors.energy,
        }
    }

    /// `Ok(None)` when the population lacks mean or std and the rule is skipped.
    fn evaluate(
        self,
        cycle: &ProductionCycle,
        stats: &CycleStatistics,
        factors: &ThresholdFactors,
    ) -> Result<Option<bool>, RuleError> {
        let Some((mean, std)) = self.population(stats).and_then(MetricSummary::mean_std) else {
            return Ok(None);
        };
        let value = self.cycle_value(cycle);
        if !value.is_finite() {
            return Err(RuleError::NonFiniteMetric { rule: self, value });
        }

        let spread = self.factor(factors) * std;
        let limit = match self {
            Self::DurationTooShort => mean - spread,
            Self::VariationTooHigh | Self::EnergyTooHigh => mean + spread,
        };
        if !limit.is_finite() {
            return Err(RuleError::NonFiniteLimit { rule: self, limit });
        }

        Ok(Some(match self {
            Self::DurationTooShort => value < limit,
            Self::VariationTooHigh | Self::EnergyTooHigh => value > limit,
        }))
    }
}

impl std::fmt::Display for QualityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::VariationTooHigh => "variation",
            Self::DurationTooShort => "duration",
            Self::EnergyTooHigh => "energy",
        };
        f.write_str(name)
    }
}

/// Scores cycles against their run's population statistics.
pub struct QualityScorer {
    factors: ThresholdFactors,
    observer: SharedObserver,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(ThresholdFactors::default())
    }
}

impl QualityScorer {
    pub fn new(factors: ThresholdFactors) -> Self {
        Self::with_observer(factors, tracing_observer())
    }

    pub fn with_observer(factors: ThresholdFactors, observer: SharedObserver) -> Self {
        Self { factors, observer }
    }

    pub fn factors(&self) -> &ThresholdFactors {
        &self.factors
    }

    /// Evaluate every rule for one cycle.
    pub fn evaluate_cycle(
        &self,
        cycle: &ProductionCycle,
        stats: &CycleStatistics,
    ) -> Result<QualityMetrics, RuleError> {
        let mut issues = Vec::new();
        for rule in QualityRule::ALL {
            if rule.evaluate(cycle, stats, &self.factors)? == Some(true) {
                issues.push(rule.message().to_string());
            }
        }

        let quality_score = 1.0 - issues.len() as f64 / RULE_COUNT as f64;
        Ok(QualityMetrics {
            cycle_id: cycle.cycle_id,
            quality_score,
            quality_grade: QualityGrade::from_score(quality_score),
            is_anomalous: !issues.is_empty(),
            issues,
        })
    }

    /// Score all cycles. Empty cycles or empty statistics give an empty report.
    pub fn score(&self, cycles: &[ProductionCycle], stats: &CycleStatistics) -> QualityReport {
        self.observer.stage_started(Stage::QualityScoring);
        if cycles.is_empty() || stats.is_empty() {
            self.observer
                .stage_completed(Stage::QualityScoring, "nothing to score");
            return QualityReport::default();
        }

        let mut metrics = Vec::with_capacity(cycles.len());
        for cycle in cycles {
            match self.evaluate_cycle(cycle, stats) {
                Ok(m) => metrics.push(m),
                Err(e) => self.observer.unit_skipped(
                    Stage::QualityScoring,
                    cycle.cycle_id,
                    &e.to_string(),
                ),
            }
        }

        let anomalous_units: Vec<usize> = metrics
            .iter()
            .filter(|m| m.is_anomalous)
            .map(|m| m.cycle_id)
            .collect();
        let summary = summarize_quality(&metrics);

        self.observer.stage_completed(
            Stage::QualityScoring,
            &format!(
                "{} cycles scored, {} anomalous",
                metrics.len(),
                anomalous_units.len()
            ),
        );
        QualityReport {
            metrics,
            anomalous_units,
            summary,
        }
    }
}

/// Roll per-cycle metrics up into a run summary. `None` for no metrics.
pub fn summarize_quality(metrics: &[QualityMetrics]) -> Option<QualitySummary> {
    if metrics.is_empty() {
        return None;
    }
    let mut quality_grade_distribution = BTreeMap::new();
    for m in metrics {
        *quality_grade_distribution.entry(m.quality_grade).or_insert(0) += 1;
    }
    Some(QualitySummary {
        total_cycles: metrics.len(),
        anomalous_cycles: metrics.iter().filter(|m| m.is_anomalous).count(),
        average_quality_score: metrics.iter().map(|m| m.quality_score).sum::<f64>()
            / metrics.len() as f64,
        quality_grade_distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::observer::{noop_observer, recording::RecordingObserver};
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::Arc;

    fn cycle(cycle_id: usize, duration: f64, energy: f64, variation: f64) -> ProductionCycle {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
            + TimeDelta::seconds(i64::try_from(cycle_id).unwrap() * 1000);
        ProductionCycle {
            cycle_id,
            start_time: start,
            end_time: start + TimeDelta::milliseconds((duration * 1000.0) as i64),
            duration_seconds: duration,
            energy_consumption: energy,
            peak_energy: energy,
            average_energy: energy,
            variation,
        }
    }

    fn summary(mean: f64, std: f64) -> Option<MetricSummary> {
        Some(MetricSummary {
            mean: Some(mean),
            std: Some(std),
            ..MetricSummary::default()
        })
    }

    fn scorer() -> QualityScorer {
        QualityScorer::with_observer(ThresholdFactors::default(), noop_observer())
    }

    #[test]
    fn test_high_variation_scores_b() {
        let stats = CycleStatistics {
            total_cycles: 1,
            variation: summary(0.2, 0.05),
            ..CycleStatistics::default()
        };
        let report = scorer().score(&[cycle(0, 30.0, 100.0, 2.0)], &stats);

        let m = &report.metrics[0];
        assert_eq!(m.issues, vec!["Variation is too high".to_string()]);
        assert!((m.quality_score - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.quality_grade, QualityGrade::B);
        assert!(m.is_anomalous);
        assert_eq!(report.anomalous_units, vec![0]);
    }

    #[test]
    fn test_missing_statistics_skip_rules() {
        // Only energy stats: the huge variation goes unnoticed
        let stats = CycleStatistics {
            total_cycles: 1,
            energy: summary(100.0, 10.0),
            variation: Some(MetricSummary {
                mean: Some(0.1),
                ..MetricSummary::default()
            }),
            ..CycleStatistics::default()
        };
        let report = scorer().score(&[cycle(0, 1.0, 100.0, 50.0)], &stats);
        assert!(report.metrics[0].issues.is_empty());
        assert_eq!(report.metrics[0].quality_grade, QualityGrade::A);
    }

    #[test]
    fn test_all_rules_triggered_in_order() {
        let stats = CycleStatistics {
            total_cycles: 1,
            duration: summary(60.0, 5.0),
            energy: summary(100.0, 10.0),
            variation: summary(0.1, 0.01),
            ..CycleStatistics::default()
        };
        let report = scorer().score(&[cycle(0, 10.0, 500.0, 0.9)], &stats);
        let m = &report.metrics[0];
        assert_eq!(
            m.issues,
            vec![
                "Variation is too high",
                "Duration is too short",
                "Energy consumption is too high",
            ]
        );
        assert_eq!(m.quality_score, 0.0);
        assert_eq!(m.quality_grade, QualityGrade::D);
    }

    #[test]
    fn test_limits_are_strict() {
        let stats = CycleStatistics {
            total_cycles: 1,
            energy: summary(100.0, 10.0),
            duration: summary(60.0, 10.0),
            ..CycleStatistics::default()
        };
        // Exactly at mean + 2 std and mean - 2 std
        let report = scorer().score(&[cycle(0, 40.0, 120.0, 0.0)], &stats);
        assert!(!report.metrics[0].is_anomalous);
    }

    #[test]
    fn test_empty_inputs_give_empty_report() {
        let stats = CycleStatistics {
            total_cycles: 1,
            energy: summary(1.0, 1.0),
            ..CycleStatistics::default()
        };
        let empty_cycles = scorer().score(&[], &stats);
        assert!(empty_cycles.metrics.is_empty());
        assert!(empty_cycles.anomalous_units.is_empty());
        assert!(empty_cycles.summary.is_none());

        let empty_stats = scorer().score(&[cycle(0, 1.0, 1.0, 0.0)], &CycleStatistics::default());
        assert_eq!(empty_stats, QualityReport::default());
    }

    #[test]
    fn test_failing_cycle_is_skipped() {
        let stats = CycleStatistics {
            total_cycles: 3,
            energy: summary(100.0, 10.0),
            ..CycleStatistics::default()
        };
        let recorder = Arc::new(RecordingObserver::default());
        let scorer = QualityScorer::with_observer(ThresholdFactors::default(), recorder.clone());
        let cycles = [
            cycle(0, 10.0, 100.0, 0.0),
            cycle(1, 10.0, f64::NAN, 0.0),
            cycle(2, 10.0, 900.0, 0.0),
        ];
        let report = scorer.score(&cycles, &stats);

        let ids: Vec<usize> = report.metrics.iter().map(|m| m.cycle_id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(report.anomalous_units, vec![2]);
        assert!(recorder
            .events()
            .iter()
            .any(|e| e.starts_with("skipped quality scoring #1")));
    }

    #[test]
    fn test_summary_rollup() {
        let stats = CycleStatistics {
            total_cycles: 2,
            energy: summary(100.0, 10.0),
            ..CycleStatistics::default()
        };
        let report = scorer().score(&[cycle(0, 5.0, 100.0, 0.0), cycle(1, 5.0, 200.0, 0.0)], &stats);
        let summary = report.summary.unwrap();
        assert_eq!(summary.total_cycles, 2);
        assert_eq!(summary.anomalous_cycles, 1);
        assert!((summary.average_quality_score - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert_eq!(summary.quality_grade_distribution.get(&QualityGrade::A), Some(&1));
        assert_eq!(summary.quality_grade_distribution.get(&QualityGrade::B), Some(&1));
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        for count in 0..=RULE_COUNT {
            let score = 1.0 - count as f64 / RULE_COUNT as f64;
            assert!((0.0..=1.0).contains(&score));
        }
    }
}
