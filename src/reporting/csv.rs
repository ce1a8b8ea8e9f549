//! Per-cycle CSV report

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::types::{ProductionCycle, QualityMetrics};

const HEADER: &str = "cycle_id,start_time,end_time,duration_seconds,energy_consumption,\
peak_energy,average_energy,variation,quality_score,quality_grade,is_anomalous,issues";

/// Quote a field if it contains a delimiter, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One row per cycle. Quality columns are matched by `cycle_id` and left
/// empty for cycles the scorer skipped.
pub fn render_csv_report(cycles: &[ProductionCycle], metrics: &[QualityMetrics]) -> String {
    let by_id: HashMap<usize, &QualityMetrics> = metrics.iter().map(|m| (m.cycle_id, m)).collect();

    let mut out = String::with_capacity(HEADER.len() + 1 + cycles.len() * 160);
    out.push_str(HEADER);
    out.push('\n');

    for cycle in cycles {
        let _ = write!(
            out,
            "{},{},{},{:.3},{:.3},{:.3},{:.3},{:.6}",
            cycle.cycle_id,
            cycle.start_time.to_rfc3339(),
            cycle.end_time.to_rfc3339(),
            cycle.duration_seconds,
            cycle.energy_consumption,
            cycle.peak_energy,
            cycle.average_energy,
            cycle.variation,
        );
        match by_id.get(&cycle.cycle_id) {
            Some(m) => {
                let _ = write!(
                    out,
                    ",{:.3},{},{},{}",
                    m.quality_score,
                    m.quality_grade,
                    m.is_anomalous,
                    escape(&m.issues.join("; "))
                );
            }
            None => out.push_str(",,,,"),
        }
        out.push('\n');
    }
    out
}
