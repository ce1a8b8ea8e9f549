//! Analyzer Configuration - every tunable of a run as TOML
//!
//! Each section implements `Default`, so a missing file, a missing section or
//! a missing key all fall back to the built-in values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::acquisition::LoadOptions;
use crate::analysis::state_classifier::DEFAULT_WINDOW_SIZE;
use crate::analysis::{
    ClassificationParams, IqrCoefficients, PipelineParams, PreprocessParams, RollingWindow,
};
use crate::types::ThresholdFactors;

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "MACHINE_ANALYZER_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "analyzer_config.toml";

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error ({}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of an analysis run.
///
/// Load with `AnalyzerConfig::load()` which searches:
/// 1. `$MACHINE_ANALYZER_CONFIG`
/// 2. `./analyzer_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub machine: MachineInfo,

    #[serde(default)]
    pub preprocessing: PreprocessingConfig,

    #[serde(default)]
    pub state_detection: StateDetectionConfig,

    #[serde(default)]
    pub segmentation: SegmentationConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl AnalyzerConfig {
    /// Load using the standard search order, falling back on any failure.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), machine = %config.machine.name, "Loaded config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(machine = %config.machine.name, "Loaded config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys and odd values are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;

        for w in super::validation::suspicious_values(&config) {
            warn!(field = %w.field, "{}", w);
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Check every value, collecting all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let pre = &self.preprocessing;
        if !pre.resample_frequency_secs.is_finite() || pre.resample_frequency_secs <= 0.0 {
            errors.push(format!(
                "preprocessing.resample_frequency_secs must be > 0 (got {})",
                pre.resample_frequency_secs
            ));
        } else if pre.resample_frequency_secs < 0.001 {
            errors.push(format!(
                "preprocessing.resample_frequency_secs must be at least 0.001 (got {})",
                pre.resample_frequency_secs
            ));
        }

        let sd = &self.state_detection;
        if sd.window_size == 0 {
            errors.push("state_detection.window_size must be > 0".to_string());
        }
        if let Some(secs) = sd.window_secs {
            if !secs.is_finite() || secs < 0.001 {
                errors.push(format!(
                    "state_detection.window_secs must be at least 0.001 (got {secs})"
                ));
            }
        }
        if !sd.production_threshold.is_finite() {
            errors.push(format!(
                "state_detection.production_threshold must be finite (got {})",
                sd.production_threshold
            ));
        }
        for (name, coefficient) in [
            ("standby_iqr_lower", sd.standby_iqr_lower),
            ("standby_iqr_upper", sd.standby_iqr_upper),
            ("production_iqr_lower", sd.production_iqr_lower),
            ("production_iqr_upper", sd.production_iqr_upper),
        ] {
            Self::check_non_negative(&format!("state_detection.{name}"), coefficient, &mut errors);
        }

        let seg = &self.segmentation;
        Self::check_non_negative("segmentation.min_duration_secs", seg.min_duration_secs, &mut errors);
        Self::check_non_negative("segmentation.max_duration_secs", seg.max_duration_secs, &mut errors);
        if seg.min_duration_secs > seg.max_duration_secs {
            errors.push(format!(
                "segmentation.min_duration_secs ({}) must be <= max_duration_secs ({})",
                seg.min_duration_secs, seg.max_duration_secs
            ));
        }

        let q = &self.quality;
        Self::check_non_negative("quality.variation_factor", q.variation_factor, &mut errors);
        Self::check_non_negative("quality.duration_factor", q.duration_factor, &mut errors);
        Self::check_non_negative("quality.energy_factor", q.energy_factor, &mut errors);

        if self.machine.energy_column.trim().is_empty() {
            errors.push("machine.energy_column must not be empty".to_string());
        }
        if self.machine.timestamp_column.trim().is_empty() {
            errors.push("machine.timestamp_column must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_non_negative(name: &str, value: f64, errors: &mut Vec<String>) {
        // NaN compares false against everything, so test finiteness first
        if !value.is_finite() {
            errors.push(format!("{name} must be finite (got {value})"));
        } else if value < 0.0 {
            errors.push(format!("{name} must be >= 0 (got {value})"));
        }
    }

    // ------------------------------------------------------------------------
    // Stage parameter views
    // ------------------------------------------------------------------------

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            timestamp_column: self.machine.timestamp_column.clone(),
            energy_column: self.machine.energy_column.clone(),
        }
    }

    pub fn pipeline_params(&self) -> PipelineParams {
        let sd = &self.state_detection;
        PipelineParams {
            preprocess: PreprocessParams {
                classification: ClassificationParams {
                    window: self.rolling_window(),
                    production_threshold: sd.production_threshold,
                    keep_threshold: sd.keep_threshold_column,
                },
                iqr: IqrCoefficients {
                    standby_lower: sd.standby_iqr_lower,
                    standby_upper: sd.standby_iqr_upper,
                    production_lower: sd.production_iqr_lower,
                    production_upper: sd.production_iqr_upper,
                },
            },
            min_duration_secs: self.segmentation.min_duration_secs,
            max_duration_secs: self.segmentation.max_duration_secs,
            factors: ThresholdFactors {
                variation: self.quality.variation_factor,
                duration: self.quality.duration_factor,
                energy: self.quality.energy_factor,
            },
        }
    }

    /// Time span when `window_secs` is set, otherwise `window_size` samples.
    pub fn rolling_window(&self) -> RollingWindow {
        let sd = &self.state_detection;
        match sd.window_secs {
            Some(secs) => RollingWindow::Duration(TimeDelta::milliseconds((secs * 1000.0).round() as i64)),
            None => RollingWindow::Samples(sd.window_size),
        }
    }

    /// Resample step at millisecond resolution.
    pub fn resample_frequency(&self) -> TimeDelta {
        TimeDelta::milliseconds((self.preprocessing.resample_frequency_secs * 1000.0).round() as i64)
    }

    /// `None` when the deadline is disabled.
    pub fn deadline(&self) -> Option<Duration> {
        (self.runtime.timeout_secs > 0).then(|| Duration::from_secs(self.runtime.timeout_secs))
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Identification metadata, shown in logs and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineInfo {
    pub name: String,
    pub timestamp_column: String,
    pub energy_column: String,
}

impl Default for MachineInfo {
    fn default() -> Self {
        Self {
            name: "machine".to_string(),
            timestamp_column: "timestamp".to_string(),
            energy_column: "value".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Resample and gap-fill before analysis
    pub enabled: bool,
    pub resample_frequency_secs: f64,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resample_frequency_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDetectionConfig {
    /// Rolling median window in samples
    pub window_size: usize,
    /// Rolling median window as a time span; takes precedence over `window_size`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<f64>,
    pub production_threshold: f64,
    pub keep_threshold_column: bool,
    pub standby_iqr_lower: f64,
    pub standby_iqr_upper: f64,
    pub production_iqr_lower: f64,
    pub production_iqr_upper: f64,
}

impl Default for StateDetectionConfig {
    fn default() -> Self {
        let classification = ClassificationParams::default();
        let iqr = IqrCoefficients::default();
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            window_secs: None,
            production_threshold: classification.production_threshold,
            keep_threshold_column: classification.keep_threshold,
            standby_iqr_lower: iqr.standby_lower,
            standby_iqr_upper: iqr.standby_upper,
            production_iqr_lower: iqr.production_lower,
            production_iqr_upper: iqr.production_upper,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 5.0,
            max_duration_secs: 300.0,
        }
    }
}

/// Sigma multipliers for the anomaly rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub variation_factor: f64,
    pub duration_factor: f64,
    pub energy_factor: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        let factors = ThresholdFactors::default();
        Self {
            variation_factor: factors.variation,
            duration_factor: factors.duration,
            energy_factor: factors.energy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub text: bool,
    pub csv: bool,
    pub json: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            text: true,
            csv: true,
            json: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Analysis deadline in seconds, 0 = none
    pub timeout_secs: u64,
}
