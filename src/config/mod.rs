//! Analyzer Configuration Module
//!
//! Run parameters loaded from TOML, replacing hardcoded thresholds with
//! operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `MACHINE_ANALYZER_CONFIG` environment variable (path to TOML file)
//! 2. `analyzer_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded config is passed explicitly to the stages that need it; there
//! is no process-wide instance.

mod analyzer_config;
pub mod validation;

pub use analyzer_config::*;
pub use validation::ValidationWarning;
