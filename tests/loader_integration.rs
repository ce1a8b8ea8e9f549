//! Loader Integration Tests
//!
//! Writes energy logs in each supported format to a temp directory, loads
//! them, prepares the series and runs the analysis end to end.

use chrono::{TimeZone, Utc};
use machine_analyzer::acquisition::{
    data_info, load_signal, load_signal_auto, preprocess, validate_data, DataFormat, LoadError,
    LoadOptions,
};
use machine_analyzer::analysis::noop_observer;
use machine_analyzer::{run_pipeline, AnalyzerConfig};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Idle zeros with three 30-second production runs, one sample per second.
fn machine_log_csv() -> String {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
    let mut csv = String::from("timestamp,value\n");
    let mut t = 0;
    let mut push = |csv: &mut String, value: f64| {
        let ts = start + chrono::TimeDelta::seconds(t);
        writeln!(csv, "{},{value}", ts.format("%Y-%m-%d %H:%M:%S")).unwrap();
        t += 1;
    };
    for _ in 0..3 {
        for _ in 0..40 {
            push(&mut csv, 0.0);
        }
        for i in 0..31 {
            push(&mut csv, 50.0 + f64::from(i % 4));
        }
    }
    for _ in 0..40 {
        push(&mut csv, 0.0);
    }
    csv
}

#[test]
fn csv_log_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "press.csv", &machine_log_csv());

    let config = AnalyzerConfig::default();
    let raw = load_signal_auto(&path, &config.load_options()).unwrap();
    assert_eq!(raw.len(), 253);
    assert!(validate_data(&raw).valid);

    let signal = preprocess(&raw, config.resample_frequency()).unwrap();
    assert_eq!(signal.len(), raw.len());

    let outcome = run_pipeline(&signal, &config.pipeline_params(), noop_observer()).unwrap();
    assert_eq!(outcome.cycles.len(), 3);
    assert!(outcome.anomalous_units().is_empty());
}

#[test]
fn json_records_with_custom_columns() {
    let dir = tempfile::tempdir().unwrap();
    let json = r#"[
        {"time": "2024-01-01T08:00:02Z", "kw": 3.5},
        {"time": "2024-01-01T08:00:00Z", "kw": 1.0},
        {"time": 1704096001, "kw": null}
    ]"#;
    let path = write_file(dir.path(), "log.json", json);
    let options = LoadOptions {
        timestamp_column: "time".to_string(),
        energy_column: "kw".to_string(),
    };

    let signal = load_signal_auto(&path, &options).unwrap();
    assert_eq!(signal.len(), 3);
    assert_eq!(signal.column_name(), "kw");
    assert_eq!(signal.values()[0], 1.0);
    assert!(signal.values()[1].is_nan());
    assert_eq!(signal.values()[2], 3.5);

    // The null reading is interpolated between its neighbours
    let filled = preprocess(&signal, chrono::TimeDelta::seconds(1)).unwrap();
    assert!((filled.values()[1] - 2.25).abs() < 1e-9);
}

#[test]
fn text_log_with_comments() {
    let dir = tempfile::tempdir().unwrap();
    let text = "# press 7 export\n\
                2024-01-01 08:00:00 10.0\n\
                2024-01-01 08:00:01 12.0\n\
                \n\
                # shift change\n\
                2024-01-01 08:00:02 -1.0\n";
    let path = write_file(dir.path(), "log.dat", text);

    let signal = load_signal(&path, DataFormat::Txt, &LoadOptions::default()).unwrap();
    assert_eq!(signal.len(), 3);

    let validation = validate_data(&signal);
    assert_eq!(validation.negative_values, 1);
    assert_eq!(validation.warning.as_deref(), Some("Negative energy values detected"));

    let info = data_info(&signal).unwrap();
    assert_eq!(info.total_records, 3);
    assert_eq!(info.duration_seconds, 2.0);
}

#[test]
fn missing_file_and_column_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_signal_auto(dir.path().join("absent.csv"), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::NotFound(_)));

    let path = write_file(dir.path(), "wrong.csv", "timestamp,power\n2024-01-01 08:00:00,1\n");
    let err = load_signal_auto(&path, &LoadOptions::default()).unwrap_err();
    match err {
        LoadError::MissingColumn { column, available } => {
            assert_eq!(column, "value");
            assert_eq!(available, "timestamp, power");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_extension_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "log.parquet", "");
    let err = load_signal_auto(&path, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedFormat(ref ext) if ext == "parquet"));
}
