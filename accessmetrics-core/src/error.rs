//! Typed errors raised at the edges of the pipeline.
//!
//! Stage plumbing propagates these through `anyhow`; callers that need to
//! branch on the failure (decode policy, sink retry, startup validation)
//! match on the concrete type.

use thiserror::Error;

/// A raw input unit could not be turned into an [`EventRecord`](crate::record::EventRecord).
///
/// Carries the original input so the caller can log it or route it elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode record: {kind} (input: {raw})")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub raw: String,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, raw: &[u8]) -> Self {
        Self {
            kind,
            raw: String::from_utf8_lossy(raw).into_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    /// The input is not a JSON object of the expected shape.
    #[error("malformed input: {0}")]
    Malformed(String),
    /// A required field is absent or null.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// A field is present but its value cannot be interpreted.
    #[error("field `{field}` is not a valid {expected}: {value}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Invalid job configuration. Raised at startup, before any input is read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window length must be positive, got {0}ms")]
    InvalidWindowLength(i64),
    #[error("epoch offset {offset}ms must lie in [0, {window_length}ms)")]
    InvalidEpochOffset { offset: i64, window_length: i64 },
    #[error("out-of-orderness bound must not be negative, got {0}ms")]
    NegativeOutOfOrderness(i64),
    #[error("`{0}` must be greater than zero")]
    MustBePositive(&'static str),
    #[error("sink backoff: initial {initial_ms}ms exceeds max {max_ms}ms")]
    InvalidBackoff { initial_ms: u64, max_ms: u64 },
    #[error("sink target must not be empty")]
    MissingSinkTarget,
    #[error("unknown weekday `{0}`")]
    UnknownWeekday(String),
    #[error("unknown value `{value}` for `{option}`")]
    UnknownValue { option: &'static str, value: String },
    #[error("failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// A sink write failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkWriteError {
    /// The target is temporarily unavailable; the same batch may be retried.
    #[error("transient sink failure: {0}")]
    Transient(String),
    /// Retrying cannot help (bad schema, unrepresentable row, ...).
    #[error("permanent sink failure: {0}")]
    Permanent(String),
    /// The retry budget for one batch was used up.
    #[error("sink write failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl SinkWriteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkWriteError::Transient(_))
    }
}

impl From<std::io::Error> for SinkWriteError {
    fn from(err: std::io::Error) -> Self {
        SinkWriteError::Transient(err.to_string())
    }
}
