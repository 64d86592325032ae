use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Event time in milliseconds since the Unix epoch (UTC).
pub type EventTime = i64;

/// Grouping key of the incident stream.
pub type SchoolId = i64;

/// Watermark: no element with a timestamp below this value is expected any more.
///
/// A window `[start, end)` is complete once a watermark with `timestamp >= end`
/// has been observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub timestamp: EventTime,
}

impl Watermark {
    /// Create a new watermark at the given timestamp.
    pub fn new(timestamp: EventTime) -> Self {
        Self { timestamp }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watermark({}ms)", self.timestamp)
    }
}

/// The unit flowing between pipeline stages: data, event-time progress, and
/// the end-of-stream marker.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamElement<T> {
    /// A data item.
    Record(T),
    /// Event time has advanced to this watermark.
    Watermark(Watermark),
    /// The upstream stage has finished.
    End,
}

impl<T> StreamElement<T> {
    /// Create a record element.
    pub fn record(value: T) -> Self {
        Self::Record(value)
    }

    /// Create a watermark element.
    pub fn watermark(timestamp: EventTime) -> Self {
        Self::Watermark(Watermark::new(timestamp))
    }
}

/// Trait bound for grouping keys.
///
/// Keys are hashed for the accumulator map, ordered for deterministic firing,
/// and serialized into checkpoints.
pub trait GroupKey:
    Clone + Eq + Hash + Ord + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

// Blanket implementation: any type satisfying the bounds is a GroupKey.
impl<T> GroupKey for T where
    T: Clone + Eq + Hash + Ord + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}
