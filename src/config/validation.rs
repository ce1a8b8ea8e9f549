//! Config validation: unknown-key detection with "did you mean" hints and
//! plausibility checks on parsed values.
//!
//! The raw TOML is walked as a `toml::Value` tree before serde sees it, so a
//! misspelled key (which serde would silently replace with its default) gets
//! reported. Everything here produces warnings only.

use std::collections::HashSet;
use std::fmt;

use super::AnalyzerConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `AnalyzerConfig`.
///
/// Kept in step with the section structs in `analyzer_config.rs` by hand.
pub fn known_config_keys() -> HashSet<&'static str> {
    [
        "machine",
        "machine.name",
        "machine.timestamp_column",
        "machine.energy_column",
        "preprocessing",
        "preprocessing.enabled",
        "preprocessing.resample_frequency_secs",
        "state_detection",
        "state_detection.window_size",
        "state_detection.window_secs",
        "state_detection.production_threshold",
        "state_detection.keep_threshold_column",
        "state_detection.standby_iqr_lower",
        "state_detection.standby_iqr_upper",
        "state_detection.production_iqr_lower",
        "state_detection.production_iqr_upper",
        "segmentation",
        "segmentation.min_duration_secs",
        "segmentation.max_duration_secs",
        "quality",
        "quality.variation_factor",
        "quality.duration_factor",
        "quality.energy_factor",
        "report",
        "report.output_dir",
        "report.text",
        "report.csv",
        "report.json",
        "runtime",
        "runtime.timeout_secs",
    ]
    .into_iter()
    .collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Collect all dotted key paths of a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
            keys.push(path);
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest known key within edit distance 3. Ties go to the alphabetically first key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

/// Warnings for every key in `raw_toml` that `AnalyzerConfig` does not know.
///
/// Unparseable input yields no warnings; the serde pass reports it.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    let mut found = walk_toml_keys(&value, "");
    found.sort();

    found
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Values that are legal but probably not what the operator meant.
pub fn suspicious_values(config: &AnalyzerConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |field: &str, message: String| {
        warnings.push(ValidationWarning {
            field: field.to_string(),
            message,
            suggestion: None,
        });
    };

    let sd = &config.state_detection;
    if sd.window_size == 1 && sd.window_secs.is_none() {
        warn(
            "state_detection.window_size",
            "window_size = 1 makes the dynamic threshold equal to the raw signal".to_string(),
        );
    }
    if sd.production_threshold <= 0.0 {
        warn(
            "state_detection.production_threshold",
            format!(
                "production_threshold = {} classifies every running sample as production",
                sd.production_threshold
            ),
        );
    }

    let seg = &config.segmentation;
    if seg.min_duration_secs == 0.0 {
        warn(
            "segmentation.min_duration_secs",
            "min_duration_secs = 0 keeps single-sample cycles".to_string(),
        );
    }
    if seg.max_duration_secs > 86_400.0 {
        warn(
            "segmentation.max_duration_secs",
            format!(
                "max_duration_secs = {} is longer than a day",
                seg.max_duration_secs
            ),
        );
    }

    let q = &config.quality;
    for (field, factor) in [
        ("quality.variation_factor", q.variation_factor),
        ("quality.duration_factor", q.duration_factor),
        ("quality.energy_factor", q.energy_factor),
    ] {
        if factor == 0.0 {
            warn(
                field,
                format!("{field} = 0 flags every cycle on the wrong side of the mean"),
            );
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("window", "window"), 0);
        assert_eq!(levenshtein("windw", "window"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let value: toml::Value = "[a]\nb = 1\n[a.c]\nd = 2\n".parse().unwrap();
        let mut keys = walk_toml_keys(&value, "");
        keys.sort();
        assert_eq!(keys, vec!["a", "a.b", "a.c", "a.c.d"]);
    }

    #[test]
    fn test_typo_key_gets_suggestion() {
        let warnings = validate_unknown_keys("[state_detection]\nwindow_sise = 10\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "state_detection.window_sise");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("state_detection.window_size")
        );
        assert!(warnings[0].to_string().contains("did you mean"));
    }

    #[test]
    fn test_valid_keys_produce_no_warnings() {
        let toml_str = r#"
[machine]
name = "press-7"

[segmentation]
min_duration_secs = 2.0

[report]
json = false
"#;
        assert!(validate_unknown_keys(toml_str).is_empty());
    }

    #[test]
    fn test_unknown_section() {
        let warnings = validate_unknown_keys("[alerts]\nemail = \"x\"\n");
        assert!(warnings.iter().any(|w| w.field == "alerts"));
        assert!(warnings.iter().any(|w| w.field == "alerts.email"));
    }

    #[test]
    fn test_garbage_has_no_suggestion() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key", &known).is_none());
    }

    #[test]
    fn test_defaults_are_not_suspicious() {
        assert!(suspicious_values(&AnalyzerConfig::default()).is_empty());
    }

    #[test]
    fn test_zero_factor_is_suspicious() {
        let mut config = AnalyzerConfig::default();
        config.quality.energy_factor = 0.0;
        let warnings = suspicious_values(&config);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "quality.energy_factor");
    }
}
