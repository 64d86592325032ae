use super::*;

/// Bounded exponential backoff for failed sink batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(5_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `initial * 2^(retry-1)`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Running totals of a [`SinkWriter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub rows_written: u64,
    pub batches_written: u64,
    pub retries: u64,
}

/// Batches results in front of a [`Sink`] and retries failed batches.
///
/// Results are buffered until `batch_size` are pending or [`flush`] is
/// called. A batch that fails transiently is retried alone, with backoff, up
/// to `max_attempts` times in total. A permanent error or an exhausted budget
/// is returned to the caller and the batch stays buffered.
///
/// [`flush`]: SinkWriter::flush
pub struct SinkWriter<S: Sink> {
    sink: S,
    policy: RetryPolicy,
    batch_size: usize,
    buffer: Vec<AggregateResult<SchoolId>>,
    stats: SinkStats,
}

impl<S: Sink> SinkWriter<S> {
    pub fn new(sink: S, batch_size: usize, policy: RetryPolicy) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            policy,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            stats: SinkStats::default(),
        }
    }

    /// Buffer one result, writing a batch once `batch_size` are pending.
    pub fn push(&mut self, result: AggregateResult<SchoolId>) -> Result<(), SinkWriteError> {
        self.buffer.push(result);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write everything buffered, in batches of at most `batch_size`.
    pub fn flush(&mut self) -> Result<(), SinkWriteError> {
        while !self.buffer.is_empty() {
            let n = self.buffer.len().min(self.batch_size);
            self.write_with_retry(n)?;
            self.buffer.drain(..n);
            self.stats.rows_written += n as u64;
            self.stats.batches_written += 1;
        }
        Ok(())
    }

    fn write_with_retry(&mut self, n: usize) -> Result<(), SinkWriteError> {
        let batch = &self.buffer[..n];
        let mut attempt = 1;
        loop {
            match self.sink.write_batch(batch) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        sink = %self.sink.describe(),
                        attempt,
                        rows = n,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "sink write failed, retrying"
                    );
                    self.stats.retries += 1;
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    tracing::error!(
                        sink = %self.sink.describe(),
                        attempts = attempt,
                        error = %err,
                        "sink retry budget exhausted"
                    );
                    return Err(SinkWriteError::Exhausted {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }
                Err(err) => {
                    tracing::error!(sink = %self.sink.describe(), error = %err, "permanent sink failure");
                    return Err(err);
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}
