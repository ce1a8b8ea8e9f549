//! Machine-readable run summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisOutcome;
use crate::types::{delta_seconds, EnergySummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionSummary {
    pub total_cycles: usize,
    pub anomalous_units: usize,
    pub average_quality_score: f64,
}

/// Top-level JSON summary of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub machine: String,
    pub analysis_timestamp: DateTime<Utc>,
    pub data_period: DataPeriod,
    /// Absent when the processed signal has no finite values
    pub energy_statistics: Option<EnergySummary>,
    pub production_summary: ProductionSummary,
}

impl SummaryStatistics {
    pub fn from_outcome(machine_name: &str, outcome: &AnalysisOutcome, generated_at: DateTime<Utc>) -> Self {
        let signal = &outcome.processed_signal;
        let duration_hours = delta_seconds(signal.span()) / 3600.0;

        Self {
            machine: machine_name.to_string(),
            analysis_timestamp: generated_at,
            data_period: DataPeriod {
                start: signal.start_time(),
                end: signal.end_time(),
                duration_hours,
            },
            energy_statistics: EnergySummary::from_signal(signal),
            production_summary: ProductionSummary {
                total_cycles: outcome.cycles.len(),
                anomalous_units: outcome.anomalous_units().len(),
                average_quality_score: outcome
                    .quality
                    .summary
                    .as_ref()
                    .map_or(0.0, |s| s.average_quality_score),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{noop_observer, run_pipeline, PipelineParams};
    use crate::types::SignalTable;
    use chrono::{TimeDelta, TimeZone};

    #[test]
    fn test_summary_of_idle_run() {
        let start = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        // Two hours of idle samples, one per minute
        let signal = SignalTable::uniform("power", start, TimeDelta::minutes(1), vec![0.0; 121]).unwrap();
        let outcome = run_pipeline(&signal, &PipelineParams::default(), noop_observer()).unwrap();

        let summary = SummaryStatistics::from_outcome("press-7", &outcome, start);
        assert_eq!(summary.machine, "press-7");
        assert_eq!(summary.data_period.start, Some(start));
        assert!((summary.data_period.duration_hours - 2.0).abs() < 1e-9);
        assert_eq!(summary.production_summary.total_cycles, 0);
        assert_eq!(summary.production_summary.average_quality_score, 0.0);

        let energy = summary.energy_statistics.unwrap();
        assert_eq!(energy.total_energy, 0.0);
        assert_eq!(energy.peak_energy, 0.0);
    }

    #[test]
    fn test_summary_json_shape() {
        let start = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let signal = SignalTable::uniform("power", start, TimeDelta::seconds(1), vec![0.0; 10]).unwrap();
        let outcome = run_pipeline(&signal, &PipelineParams::default(), noop_observer()).unwrap();
        let json = serde_json::to_value(SummaryStatistics::from_outcome("m", &outcome, start)).unwrap();

        assert!(json["data_period"]["duration_hours"].is_number());
        assert!(json["energy_statistics"]["average_energy"].is_number());
        assert_eq!(json["production_summary"]["anomalous_units"], 0);
    }
}
