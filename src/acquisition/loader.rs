//! Energy Data Loader
//!
//! Reads a single timestamped energy column from a file into a `SignalTable`.
//!
//! Supported formats:
//! - **csv**: header row, comma separated, quoted fields allowed
//! - **json**: array of records (`[{"timestamp": ..., "value": ...}, ...]`)
//! - **txt**: comma separated with a header, or whitespace separated
//!   `<timestamp...> <value>` lines with `#` comments
//!
//! Rows come back sorted by time. When a timestamp repeats, the last row wins.
//! Empty, `nan` and `null` values load as missing (NaN) so that validation
//! can count them.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{SignalError, SignalTable, DEFAULT_ENERGY_COLUMN};

/// Default name of the timestamp column
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "timestamp";

/// Per-file cap on individually logged row warnings
const MAX_ROW_WARNINGS: usize = 10;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Data file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Column '{column}' not found (available: {available})")]
    MissingColumn { column: String, available: String },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected a JSON array of records in {}", .0.display())]
    NotARecordArray(PathBuf),

    #[error("No valid data found in {} ({errors} rows rejected)", .path.display())]
    NoData { path: PathBuf, errors: usize },

    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
    Txt,
}

impl DataFormat {
    /// Guess from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        ext.parse()
    }
}

impl FromStr for DataFormat {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "txt" | "dat" => Ok(Self::Txt),
            other => Err(LoadError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Txt => "txt",
        })
    }
}

/// Which columns hold the timestamp and the energy reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub timestamp_column: String,
    pub energy_column: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            energy_column: DEFAULT_ENERGY_COLUMN.to_string(),
        }
    }
}

/// Rows parsed from a file, before sorting.
#[derive(Debug, Default)]
struct RowCollector {
    rows: Vec<(DateTime<Utc>, f64)>,
    errors: usize,
}

impl RowCollector {
    fn reject(&mut self, line: usize, reason: &str) {
        if self.errors < MAX_ROW_WARNINGS {
            warn!(line, reason, "Skipping row");
        }
        self.errors += 1;
    }

    fn into_signal(mut self, path: &Path, column: &str) -> Result<SignalTable, LoadError> {
        if self.rows.is_empty() {
            return Err(LoadError::NoData {
                path: path.to_path_buf(),
                errors: self.errors,
            });
        }
        // Stable sort keeps file order among equal timestamps
        self.rows.sort_by_key(|(t, _)| *t);
        let mut deduped: Vec<(DateTime<Utc>, f64)> = Vec::with_capacity(self.rows.len());
        for (t, v) in self.rows {
            match deduped.last_mut() {
                Some(last) if last.0 == t => last.1 = v,
                _ => deduped.push((t, v)),
            }
        }
        let (timestamps, values) = deduped.into_iter().unzip();
        Ok(SignalTable::new(column, timestamps, values)?)
    }
}

/// Load `path` in the given format.
pub fn load_signal(
    path: impl AsRef<Path>,
    format: DataFormat,
    options: &LoadOptions,
) -> Result<SignalTable, LoadError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let collector = match format {
        DataFormat::Csv => parse_csv(&content, options)?,
        DataFormat::Json => parse_json(&content, options).map_err(|e| match e {
            JsonFailure::Syntax(source) => LoadError::Json {
                path: path.to_path_buf(),
                source,
            },
            JsonFailure::Shape => LoadError::NotARecordArray(path.to_path_buf()),
        })?,
        DataFormat::Txt => parse_txt(&content, options)?,
    };
    let errors = collector.errors;
    let signal = collector.into_signal(path, &options.energy_column)?;

    info!(
        path = %path.display(),
        format = %format,
        records = signal.len(),
        rejected = errors,
        "Loaded energy data"
    );
    Ok(signal)
}

/// Load `path`, guessing the format from its extension.
pub fn load_signal_auto(path: impl AsRef<Path>, options: &LoadOptions) -> Result<SignalTable, LoadError> {
    let path = path.as_ref();
    load_signal(path, DataFormat::from_path(path)?, options)
}

// ============================================================================
// CSV
// ============================================================================

/// Split a CSV line, honoring double-quoted fields and `""` escapes.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

fn column_index(header: &[String], column: &str) -> Result<usize, LoadError> {
    header
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| LoadError::MissingColumn {
            column: column.to_string(),
            available: header.iter().map(|h| h.trim()).collect::<Vec<_>>().join(", "),
        })
}

fn parse_csv(content: &str, options: &LoadOptions) -> Result<RowCollector, LoadError> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let Some((_, header_line)) = lines.next() else {
        return Ok(RowCollector::default());
    };
    let header = csv_split(header_line);
    let ts_idx = column_index(&header, &options.timestamp_column)?;
    let value_idx = column_index(&header, &options.energy_column)?;

    let mut collector = RowCollector::default();
    for (i, line) in lines {
        let line_num = i + 1;
        let fields = csv_split(line);
        let (Some(ts_raw), Some(value_raw)) = (fields.get(ts_idx), fields.get(value_idx)) else {
            collector.reject(line_num, "missing fields");
            continue;
        };
        let Some(timestamp) = parse_timestamp(ts_raw) else {
            collector.reject(line_num, "unparseable timestamp");
            continue;
        };
        match parse_value(value_raw) {
            Some(value) => collector.rows.push((timestamp, value)),
            None => collector.reject(line_num, "unparseable value"),
        }
    }
    Ok(collector)
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Debug)]
enum JsonFailure {
    Syntax(serde_json::Error),
    Shape,
}

fn parse_json(content: &str, options: &LoadOptions) -> Result<RowCollector, JsonFailure> {
    let root: Value = serde_json::from_str(content).map_err(JsonFailure::Syntax)?;
    let Value::Array(records) = root else {
        return Err(JsonFailure::Shape);
    };

    let mut collector = RowCollector::default();
    for (i, record) in records.iter().enumerate() {
        let ts = record.get(&options.timestamp_column);
        let timestamp = match ts {
            Some(Value::String(s)) => parse_timestamp(s),
            Some(Value::Number(n)) => n.as_f64().and_then(epoch_to_datetime),
            _ => None,
        };
        let Some(timestamp) = timestamp else {
            collector.reject(i + 1, "unparseable timestamp");
            continue;
        };
        let value = match record.get(&options.energy_column) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::Null) | None => Some(f64::NAN),
            Some(Value::String(s)) => parse_value(s),
            _ => None,
        };
        match value {
            Some(v) => collector.rows.push((timestamp, v)),
            None => collector.reject(i + 1, "unparseable value"),
        }
    }
    Ok(collector)
}

// ============================================================================
// Text
// ============================================================================

fn parse_txt(content: &str, options: &LoadOptions) -> Result<RowCollector, LoadError> {
    let first = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'));
    if first.is_some_and(|l| l.contains(',')) {
        return parse_csv(content, options);
    }

    let mut collector = RowCollector::default();
    for (i, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            collector.reject(i + 1, "expected '<timestamp> <value>'");
            continue;
        }
        let (value_raw, ts_parts) = (parts[parts.len() - 1], &parts[..parts.len() - 1]);
        // Header line naming the columns
        if value_raw == options.energy_column && ts_parts.contains(&options.timestamp_column.as_str()) {
            continue;
        }
        let Some(timestamp) = parse_timestamp(&ts_parts.join(" ")) else {
            collector.reject(i + 1, "unparseable timestamp");
            continue;
        };
        match parse_value(value_raw) {
            Some(value) => collector.rows.push((timestamp, value)),
            None => collector.reject(i + 1, "unparseable value"),
        }
    }
    Ok(collector)
}

// ============================================================================
// Field parsing
// ============================================================================

/// Parse an energy reading. Blank, `nan`, `null` and `-` load as missing.
fn parse_value(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty()
        || s.eq_ignore_ascii_case("nan")
        || s.eq_ignore_ascii_case("null")
        || s == "-"
    {
        return Some(f64::NAN);
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Epoch seconds, or milliseconds when the magnitude says so.
fn epoch_to_datetime(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    let millis = if epoch.abs() > 10_000_000_000.0 {
        epoch
    } else {
        epoch * 1000.0
    };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

/// Parse the timestamp forms seen in exported machine logs.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return None;
    }

    if let Ok(epoch) = s.parse::<f64>() {
        return epoch_to_datetime(epoch);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // Naive forms are taken as UTC
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
        "%d.%m.%Y %H:%M:%S%.f",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn opts() -> LoadOptions {
        LoadOptions::default()
    }

    #[test]
    fn test_csv_split_quoted() {
        assert_eq!(csv_split(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
        assert_eq!(csv_split(r#""say ""hi""",1"#), vec![r#"say "hi""#, "1"]);
        assert_eq!(csv_split("x,,y"), vec!["x", "", "y"]);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 5).unwrap();
        for s in [
            "2023-03-01 12:00:05",
            "2023-03-01T12:00:05",
            "2023-03-01T12:00:05Z",
            "2023-03-01T13:00:05+01:00",
            "2023-03-01 12:00:05+00:00",
            "\"2023-03-01 12:00:05\"",
            "1677672005",
            "1677672005000",
        ] {
            assert_eq!(parse_timestamp(s), Some(expected), "{s}");
        }
        assert_eq!(
            parse_timestamp("2023-03-01 12:00:05.250"),
            Some(expected + TimeDelta::milliseconds(250))
        );
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_parse_value_missing_markers() {
        assert!(parse_value("").unwrap().is_nan());
        assert!(parse_value("NaN").unwrap().is_nan());
        assert!(parse_value("null").unwrap().is_nan());
        assert_eq!(parse_value(" 4.5 "), Some(4.5));
        assert_eq!(parse_value("abc"), None);
    }

    #[test]
    fn test_csv_sorts_and_keeps_last_duplicate() {
        let csv = "timestamp,value\n\
                   2023-01-01 00:00:02,3\n\
                   2023-01-01 00:00:00,1\n\
                   2023-01-01 00:00:02,4\n\
                   2023-01-01 00:00:01,2\n";
        let collector = parse_csv(csv, &opts()).unwrap();
        let signal = collector.into_signal(Path::new("mem.csv"), "value").unwrap();
        assert_eq!(signal.values(), &[1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_csv_missing_column() {
        let err = parse_csv("time,power\n1,2\n", &opts()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { ref column, .. } if column == "timestamp"));
    }

    #[test]
    fn test_csv_rejects_bad_rows() {
        let csv = "timestamp,value\nnot-a-time,1\n2023-01-01 00:00:00,oops\n2023-01-01 00:00:01,5\n";
        let collector = parse_csv(csv, &opts()).unwrap();
        assert_eq!(collector.errors, 2);
        assert_eq!(collector.rows.len(), 1);
    }

    #[test]
    fn test_json_records() {
        let json = r#"[
            {"timestamp": "2023-01-01T00:00:01Z", "value": 2.5},
            {"timestamp": 1672531200, "value": null}
        ]"#;
        let collector = parse_json(json, &opts()).ok().unwrap();
        let signal = collector.into_signal(Path::new("mem.json"), "value").unwrap();
        assert_eq!(signal.len(), 2);
        assert!(signal.values()[0].is_nan());
        assert_eq!(signal.values()[1], 2.5);
    }

    #[test]
    fn test_json_must_be_array() {
        assert!(matches!(parse_json(r#"{"a": 1}"#, &opts()), Err(JsonFailure::Shape)));
        assert!(matches!(parse_json("[", &opts()), Err(JsonFailure::Syntax(_))));
    }

    #[test]
    fn test_txt_whitespace_lines() {
        let txt = "# machine dump\n\
                   timestamp value\n\
                   2023-01-01 00:00:00 10.0\n\
                   2023-01-01 00:00:01   12.5\n\
                   garbage\n";
        let collector = parse_txt(txt, &opts()).unwrap();
        assert_eq!(collector.rows.len(), 2);
        assert_eq!(collector.errors, 1);
        assert_eq!(collector.rows[1].1, 12.5);
    }

    #[test]
    fn test_txt_falls_back_to_csv() {
        let txt = "timestamp,value\n2023-01-01 00:00:00,1\n";
        assert_eq!(parse_txt(txt, &opts()).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DataFormat::from_path(Path::new("a/b.CSV")).unwrap(), DataFormat::Csv);
        assert_eq!(DataFormat::from_path(Path::new("dump.txt")).unwrap(), DataFormat::Txt);
        assert!(matches!(
            DataFormat::from_path(Path::new("x.parquet")),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }
}
