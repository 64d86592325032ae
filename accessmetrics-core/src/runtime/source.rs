use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::DecodeErrorPolicy;
use crate::record::{decode_record, EventRecord};
use crate::types::SchoolId;

use super::{JobMetrics, ShutdownSignal};

/// A line-oriented input: a file, stdin, or an in-memory buffer.
pub type LineSource = Box<dyn BufRead + Send>;

/// Open `input`: a file path, or `-` for stdin.
pub fn open_input(input: &str) -> Result<LineSource> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).with_context(|| format!("failed to open input {}", input))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Reads and decodes records one line at a time, applying the decode-error
/// policy and honoring the shutdown signal.
///
/// Lines are read as raw bytes, so input that is not UTF-8 reaches the
/// decoder and is handled like any other undecodable record.
pub struct RecordReader<R> {
    input: R,
    line: Vec<u8>,
    policy: DecodeErrorPolicy,
    metrics: Arc<JobMetrics>,
    shutdown: ShutdownSignal,
    interrupted: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(
        input: R,
        policy: DecodeErrorPolicy,
        metrics: Arc<JobMetrics>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            input,
            line: Vec::new(),
            policy,
            metrics,
            shutdown,
            interrupted: false,
        }
    }

    /// Next decoded record, or `None` when the input is exhausted or a
    /// shutdown was requested. Blank lines are skipped.
    pub fn next_record(&mut self) -> Result<Option<EventRecord<SchoolId>>> {
        loop {
            if self.shutdown.is_triggered() {
                self.interrupted = true;
                return Ok(None);
            }
            self.line.clear();
            let n = self
                .input
                .read_until(b'\n', &mut self.line)
                .context("failed to read input line")?;
            if n == 0 {
                return Ok(None);
            }
            let raw = trim_line_end(&self.line);
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            JobMetrics::incr(&self.metrics.records_read);

            match decode_record(raw) {
                Ok(record) => return Ok(Some(record)),
                Err(err) => {
                    JobMetrics::incr(&self.metrics.decode_errors);
                    match self.policy {
                        DecodeErrorPolicy::Skip => {
                            tracing::warn!(error = %err.kind, raw = %err.raw, "skipping undecodable record");
                        }
                        DecodeErrorPolicy::Fail => {
                            return Err(anyhow::Error::new(err).context("aborting on undecodable record"));
                        }
                    }
                }
            }
        }
    }

    /// Whether reading stopped because of a shutdown request.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
