use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters of a running job, shared by its stages.
#[derive(Debug, Default)]
pub struct JobMetrics {
    pub records_read: AtomicU64,
    pub decode_errors: AtomicU64,
    pub late_events_dropped: AtomicU64,
    pub windows_emitted: AtomicU64,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Final report of a job run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub records_read: u64,
    pub decode_errors: u64,
    pub late_events_dropped: u64,
    pub windows_emitted: u64,
    pub rows_written: u64,
    pub sink_batches: u64,
    pub sink_retries: u64,
    /// Windows still open when the job stopped.
    pub open_windows: u64,
    /// Whether the job stopped on a shutdown request rather than end of input.
    pub interrupted: bool,
    pub checkpoint_written: bool,
}

impl std::fmt::Display for JobSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "records={} decode_errors={} late_dropped={} windows={} rows={} batches={} retries={} open={}{}",
            self.records_read,
            self.decode_errors,
            self.late_events_dropped,
            self.windows_emitted,
            self.rows_written,
            self.sink_batches,
            self.sink_retries,
            self.open_windows,
            if self.interrupted { " (interrupted)" } else { "" },
        )
    }
}
