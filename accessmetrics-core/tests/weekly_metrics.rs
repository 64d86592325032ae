use std::path::{Path, PathBuf};

use accessmetrics_core::config::SinkType;
use accessmetrics_core::sink::{UpsertSink, WeeklyMetrics};
use accessmetrics_core::{run_job, JobConfig, ShutdownSignal};
use chrono::NaiveDate;

const HOUR: i64 = 60 * 60 * 1000;
const DAY: i64 = 24 * HOUR;
/// 2024-01-01T00:00:00Z, a Monday.
const MONDAY: i64 = 1_704_067_200_000;

fn unique_temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "accessmetrics-it-{}-{}-{}",
        name,
        std::process::id(),
        nanos
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn report(id: usize, school: i64, timestamp: i64, category: &str, severity: i64) -> String {
    format!(
        r#"{{"eventId":"r-{id}","schoolId":{school},"schoolName":"School {school}","eventType":"ACCESSIBILITY_REPORT","disabilityType":"{category}","severity":{severity},"timestamp":{timestamp}}}"#
    )
}

/// Two weeks for two schools, one undecodable line and one late report.
fn write_input(dir: &Path) -> PathBuf {
    let lines = [
        report(0, 42, MONDAY + 9 * HOUR, "VISUAL", 2),
        report(1, 7, MONDAY + DAY, "HEARING", 5),
        report(2, 42, MONDAY + 2 * DAY, "MOTOR", 4),
        "{\"schoolId\": 42".to_string(),
        report(3, 42, MONDAY + 7 * DAY + HOUR, "VISUAL", 3),
        // The first week is closed by now.
        report(4, 7, MONDAY + 3 * DAY, "HEARING", 1),
        report(5, 7, MONDAY + 8 * DAY, "COGNITIVE", 1),
    ];
    let path = dir.join("events.jsonl");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn config(input: &Path, sink_type: SinkType, target: PathBuf) -> JobConfig {
    JobConfig {
        input: input.display().to_string(),
        week_start: Some("monday".to_string()),
        sink_type,
        sink_target: target.display().to_string(),
        sink_batch_size: 2,
        parallelism: 2,
        ..JobConfig::default()
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_file_sink_writes_weekly_rows() {
    let dir = unique_temp_dir("file");
    let input = write_input(&dir);
    let output = dir.join("out").join("metrics.jsonl");

    let summary = run_job(config(&input, SinkType::File, output.clone()), ShutdownSignal::new()).unwrap();
    assert_eq!(summary.records_read, 7);
    assert_eq!(summary.decode_errors, 1);
    assert_eq!(summary.late_events_dropped, 1);
    assert_eq!(summary.windows_emitted, 4);
    assert_eq!(summary.rows_written, 4);

    let text = std::fs::read_to_string(&output).unwrap();
    let mut rows: Vec<WeeklyMetrics> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    rows.sort_by_key(|r| (r.week_start, r.school_id));

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].school_id, 7);
    assert_eq!(rows[0].week_start, date(2024, 1, 1));
    assert_eq!(rows[0].week_end, date(2024, 1, 7));
    assert_eq!(rows[0].total_reports, 1);
    assert_eq!(rows[0].avg_severity, 5.0);

    assert_eq!(rows[1].school_id, 42);
    assert_eq!(rows[1].total_reports, 2);
    assert_eq!(rows[1].avg_severity, 3.0);
    assert_eq!(rows[1].reports_by_disability.get("MOTOR"), Some(&1));

    assert_eq!(rows[2].week_start, date(2024, 1, 8));
    assert_eq!(rows[3].week_end, date(2024, 1, 14));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_upsert_sink_is_idempotent_across_runs() {
    let dir = unique_temp_dir("upsert");
    let input = write_input(&dir);
    let db = dir.join("metrics.db");

    for _ in 0..2 {
        let summary =
            run_job(config(&input, SinkType::UpsertDb, db.clone()), ShutdownSignal::new()).unwrap();
        assert_eq!(summary.rows_written, 4);
    }

    let sink = UpsertSink::open(&db).unwrap();
    assert_eq!(sink.row_count().unwrap(), 4);
    let rows = sink.rows().unwrap();
    assert_eq!(rows[0].week_start, date(2024, 1, 1));
    assert_eq!(rows[0].school_id, 7);
    assert_eq!(rows[3].school_id, 42);
    assert_eq!(rows[3].week_start, date(2024, 1, 8));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_input_fails() {
    let dir = unique_temp_dir("missing");
    let err = run_job(
        config(&dir.join("nope.jsonl"), SinkType::File, dir.join("out.jsonl")),
        ShutdownSignal::new(),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("failed to open input"));
    let _ = std::fs::remove_dir_all(&dir);
}
