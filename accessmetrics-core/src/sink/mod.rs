//! Delivery of finalized window results.
//!
//! A [`Sink`] writes one batch at a time. [`SinkWriter`] sits in front of it,
//! buffering results into batches and retrying transient failures with
//! exponential backoff. Two sinks are provided: an append-only JSON-lines
//! [`FileSink`] and an idempotent SQLite [`UpsertSink`].

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{JobConfig, SinkType};
use crate::error::SinkWriteError;
use crate::state::AggregateResult;
use crate::types::{EventTime, SchoolId};

mod file;
mod upsert;
mod writer;

pub use file::*;
pub use upsert::*;
pub use writer::*;

/// Destination for finalized results.
///
/// `write_batch` either stores the whole batch or fails; a failed batch may be
/// handed to it again.
pub trait Sink: Send {
    fn write_batch(&mut self, batch: &[AggregateResult<SchoolId>]) -> Result<(), SinkWriteError>;

    /// Short label used in logs.
    fn describe(&self) -> String;
}

impl Sink for Box<dyn Sink> {
    fn write_batch(&mut self, batch: &[AggregateResult<SchoolId>]) -> Result<(), SinkWriteError> {
        (**self).write_batch(batch)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// One output row: the weekly metrics of one school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyMetrics {
    pub school_id: SchoolId,
    pub week_start: NaiveDate,
    /// Inclusive: the date of the last millisecond in the window.
    pub week_end: NaiveDate,
    pub total_reports: i64,
    pub avg_severity: f64,
    pub reports_by_disability: BTreeMap<String, i64>,
}

impl TryFrom<&AggregateResult<SchoolId>> for WeeklyMetrics {
    type Error = SinkWriteError;

    fn try_from(result: &AggregateResult<SchoolId>) -> Result<Self, Self::Error> {
        Ok(Self {
            school_id: result.key,
            week_start: utc_date(result.window_start)?,
            week_end: utc_date(result.window_end.saturating_sub(1))?,
            total_reports: result.count,
            avg_severity: result.average,
            reports_by_disability: result.category_breakdown.clone(),
        })
    }
}

fn utc_date(timestamp: EventTime) -> Result<NaiveDate, SinkWriteError> {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| {
            SinkWriteError::Permanent(format!("timestamp {timestamp}ms is outside the calendar range"))
        })
}

/// Open the sink named by `config`.
pub fn open_sink(config: &JobConfig) -> Result<Box<dyn Sink>> {
    let sink: Box<dyn Sink> = match config.sink_type {
        SinkType::File => Box::new(FileSink::open(&config.sink_target)?),
        SinkType::UpsertDb => Box::new(UpsertSink::open(&config.sink_target)?),
    };
    tracing::info!(sink = %sink.describe(), "opened sink");
    Ok(sink)
}

#[cfg(test)]
#[path = "tests/sink_tests.rs"]
mod tests;
