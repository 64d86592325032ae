use super::*;

/// A half-open event-time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    /// A window is closed once the watermark has reached its end.
    pub fn is_closed_at(&self, watermark: Watermark) -> bool {
        self.end <= watermark.timestamp
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeWindow([{}, {}))", self.start, self.end)
    }
}

/// Identity of one aggregation cell: a grouping key inside one window.
///
/// Ordered by window end first, then start, then key, which is the order
/// closed windows are fired in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId<K> {
    pub key: K,
    pub window: TimeWindow,
}

impl<K> WindowId<K> {
    pub fn new(key: K, window: TimeWindow) -> Self {
        Self { key, window }
    }

    pub fn start(&self) -> EventTime {
        self.window.start
    }

    pub fn end(&self) -> EventTime {
        self.window.end
    }
}

impl<K: Ord> Ord for WindowId<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.window
            .end
            .cmp(&other.window.end)
            .then(self.window.start.cmp(&other.window.start))
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl<K: Ord> PartialOrd for WindowId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: std::fmt::Debug> std::fmt::Display for WindowId<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}@{}", self.key, self.window)
    }
}
