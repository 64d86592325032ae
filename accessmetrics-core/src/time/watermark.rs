use super::*;

/// Minimum possible event time. Used as the initial "no data yet" sentinel.
pub const EVENT_TIME_MIN: EventTime = i64::MIN;

/// Maximum possible event time. Advancing to it closes every window.
pub const EVENT_TIME_MAX: EventTime = i64::MAX;

/// Event-time clock for streams where events arrive out of order by at most
/// `max_delay_ms`.
///
/// The watermark is `max_seen_timestamp - max_delay_ms`, so the system waits
/// `max_delay_ms` past a window's end before closing it. There is one tracker
/// per job, owned by the ingest stage; it is never kept per key.
///
/// The watermark is monotonically non-decreasing: late events never pull it
/// backwards, and an explicit [`advance_to`](Self::advance_to) raises a floor
/// that later observations cannot undercut.
///
/// # Example
/// ```
/// use accessmetrics_core::time::WatermarkTracker;
///
/// // Allow up to 10 minutes of out-of-order arrival.
/// let mut tracker = WatermarkTracker::new(10 * 60 * 1000);
/// assert_eq!(tracker.current(), None);
/// let wm = tracker.observe(3_600_000);
/// assert_eq!(wm.timestamp, 3_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkTracker {
    max_delay_ms: i64,
    max_seen_timestamp: EventTime,
    watermark: EventTime,
}

impl WatermarkTracker {
    /// Create a tracker with the given out-of-orderness bound in milliseconds.
    pub fn new(max_delay_ms: i64) -> Self {
        Self {
            max_delay_ms,
            max_seen_timestamp: EVENT_TIME_MIN,
            watermark: EVENT_TIME_MIN,
        }
    }

    /// Notify the tracker of an event timestamp and return the current watermark.
    pub fn observe(&mut self, timestamp: EventTime) -> Watermark {
        if timestamp > self.max_seen_timestamp {
            self.max_seen_timestamp = timestamp;
            let candidate = timestamp.saturating_sub(self.max_delay_ms);
            if candidate > self.watermark {
                self.watermark = candidate;
            }
        }
        Watermark::new(self.watermark)
    }

    /// Push the watermark forward without an event (heartbeat, end of input).
    ///
    /// Returns the new watermark if it moved; a target at or below the current
    /// watermark is ignored.
    pub fn advance_to(&mut self, timestamp: EventTime) -> Option<Watermark> {
        if timestamp > self.watermark {
            self.watermark = timestamp;
            Some(Watermark::new(timestamp))
        } else {
            None
        }
    }

    /// The current watermark, or `None` before the first event.
    pub fn current(&self) -> Option<Watermark> {
        if self.watermark == EVENT_TIME_MIN {
            return None;
        }
        Some(Watermark::new(self.watermark))
    }

    /// Highest event timestamp seen so far.
    pub fn max_seen(&self) -> Option<EventTime> {
        (self.max_seen_timestamp != EVENT_TIME_MIN).then_some(self.max_seen_timestamp)
    }

    pub fn max_delay_ms(&self) -> i64 {
        self.max_delay_ms
    }
}
