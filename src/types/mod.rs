//! Shared data structures for the machine energy analysis pipeline
//!
//! - SignalTable: time-ordered energy series (loader / preprocessor output)
//! - StateMasks: off / on / standby / production masks (state classification)
//! - ProductionCycle, CycleStatistics: segmented cycles and their population summary
//! - QualityMetrics, QualitySummary: per-cycle grades and the run roll-up

mod signal;
mod state;
mod cycle;
mod quality;

pub use signal::*;
pub use state::*;
pub use cycle::*;
pub use quality::*;
