//! Incident records and the decoder that produces them from raw input.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, DecodeErrorKind};
use crate::types::{EventTime, SchoolId};

mod decoder;

pub use decoder::*;

/// One decoded incident.
///
/// `key` groups records (the school), `category` feeds the per-category
/// breakdown (the disability type) and `value` feeds the average (the
/// severity). Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord<K = SchoolId> {
    pub key: K,
    pub timestamp: EventTime,
    pub category: String,
    pub value: Option<f64>,
    pub event_id: Option<String>,
    pub event_type: Option<String>,
}

impl<K> EventRecord<K> {
    /// Create a record with no descriptive fields.
    pub fn new(key: K, timestamp: EventTime, category: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            key,
            timestamp,
            category: category.into(),
            value,
            event_id: None,
            event_type: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

#[cfg(test)]
#[path = "tests/decoder_tests.rs"]
mod tests;
