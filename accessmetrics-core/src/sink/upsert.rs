use std::path::Path;

use anyhow::Context;
use rusqlite::{params, Connection, ErrorCode};

use super::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS weekly_metrics (
    school_id INTEGER NOT NULL,
    week_start TEXT NOT NULL,
    week_end TEXT NOT NULL,
    total_reports INTEGER NOT NULL,
    avg_severity REAL NOT NULL,
    reports_by_disability TEXT NOT NULL,
    PRIMARY KEY (school_id, week_start)
);
"#;

const INSERT: &str = r#"
INSERT INTO weekly_metrics
    (school_id, week_start, week_end, total_reports, avg_severity, reports_by_disability)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT (school_id, week_start) DO NOTHING
"#;

/// SQLite sink keyed by `(school_id, week_start)`.
///
/// Writing the same result twice leaves one row, so a batch that failed
/// halfway can be replayed safely. Each batch is one transaction.
pub struct UpsertSink {
    conn: Connection,
    label: String,
    inserted: u64,
    duplicates: u64,
}

impl UpsertSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite database {}", path.display()))?;
        Self::with_connection(conn, format!("sqlite:{}", path.display()))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite database")?;
        Self::with_connection(conn, "sqlite::memory:".to_string())
    }

    fn with_connection(conn: Connection, label: String) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("create weekly_metrics table")?;
        Ok(Self {
            conn,
            label,
            inserted: 0,
            duplicates: 0,
        })
    }

    /// Rows actually inserted by this sink.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Rows skipped because their key already existed.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn row_count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM weekly_metrics", [], |row| row.get(0))?;
        Ok(n)
    }

    /// All stored rows, ordered by week then school.
    pub fn rows(&self) -> Result<Vec<WeeklyMetrics>> {
        let mut stmt = self.conn.prepare(
            "SELECT school_id, week_start, week_end, total_reports, avg_severity, reports_by_disability \
             FROM weekly_metrics ORDER BY week_start, school_id",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(school_id, start, end, total, avg, breakdown)| -> Result<WeeklyMetrics> {
                Ok(WeeklyMetrics {
                    school_id,
                    week_start: start.parse().with_context(|| format!("bad week_start {start}"))?,
                    week_end: end.parse().with_context(|| format!("bad week_end {end}"))?,
                    total_reports: total,
                    avg_severity: avg,
                    reports_by_disability: serde_json::from_str(&breakdown)
                        .context("bad reports_by_disability")?,
                })
            })
            .collect()
    }
}

impl Sink for UpsertSink {
    fn write_batch(&mut self, batch: &[AggregateResult<SchoolId>]) -> Result<(), SinkWriteError> {
        let rows = batch
            .iter()
            .map(WeeklyMetrics::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let tx = self.conn.transaction().map_err(classify)?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare_cached(INSERT).map_err(classify)?;
            for row in &rows {
                let breakdown = serde_json::to_string(&row.reports_by_disability)
                    .map_err(|e| SinkWriteError::Permanent(e.to_string()))?;
                let changed = stmt
                    .execute(params![
                        row.school_id,
                        row.week_start.to_string(),
                        row.week_end.to_string(),
                        row.total_reports,
                        row.avg_severity,
                        breakdown,
                    ])
                    .map_err(classify)?;
                inserted += changed as u64;
            }
        }
        tx.commit().map_err(classify)?;

        self.inserted += inserted;
        self.duplicates += rows.len() as u64 - inserted;
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Busy, locked and I/O failures may clear up; everything else will not.
fn classify(err: rusqlite::Error) -> SinkWriteError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
            ) =>
        {
            SinkWriteError::Transient(err.to_string())
        }
        _ => SinkWriteError::Permanent(err.to_string()),
    }
}
