use super::*;

/// One week in milliseconds, the default window length.
pub const WEEK_MS: i64 = 7 * DAY_MS;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Map `timestamp` to its tumbling window of `window_length_ms`, aligned to
/// the epoch shifted by `epoch_offset_ms`.
///
/// Negative timestamps use Euclidean remainder, so `[start, end)` always
/// contains `timestamp`. The caller guarantees `window_length_ms > 0`.
pub fn assign(timestamp: EventTime, window_length_ms: i64, epoch_offset_ms: i64) -> TimeWindow {
    // Widened so that timestamps near the i64 bounds cannot overflow.
    let ts = timestamp as i128;
    let size = window_length_ms as i128;
    let start = ts - (ts - epoch_offset_ms as i128).rem_euclid(size);
    let end = (start + size).min(EventTime::MAX as i128);
    TimeWindow::new(start as EventTime, end as EventTime)
}

/// Offset that aligns 7-day windows to 00:00:00 UTC on `day`.
///
/// 1970-01-01 was a Thursday, so Thursday maps to 0 and Monday to 4 days.
pub fn offset_for_weekday(day: Weekday) -> i64 {
    let thursday = Weekday::Thu.num_days_from_monday() as i64;
    let from_thursday = (day.num_days_from_monday() as i64 - thursday).rem_euclid(7);
    from_thursday * DAY_MS
}

/// Fixed-size, non-overlapping event-time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TumblingWindows {
    size_ms: i64,
    offset_ms: i64,
}

impl TumblingWindows {
    /// Create tumbling windows of `size_ms`, shifted by `offset_ms`.
    ///
    /// The offset must lie in `[0, size_ms)`.
    pub fn new(size_ms: i64, offset_ms: i64) -> Result<Self, ConfigError> {
        if size_ms <= 0 {
            return Err(ConfigError::InvalidWindowLength(size_ms));
        }
        if !(0..size_ms).contains(&offset_ms) {
            return Err(ConfigError::InvalidEpochOffset {
                offset: offset_ms,
                window_length: size_ms,
            });
        }
        Ok(Self { size_ms, offset_ms })
    }

    /// Calendar weeks starting at midnight UTC on `day`.
    pub fn weekly(day: Weekday) -> Self {
        Self {
            size_ms: WEEK_MS,
            offset_ms: offset_for_weekday(day),
        }
    }

    pub fn assign(&self, timestamp: EventTime) -> TimeWindow {
        assign(timestamp, self.size_ms, self.offset_ms)
    }

    pub fn size_ms(&self) -> i64 {
        self.size_ms
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }
}
