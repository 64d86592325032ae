//! Job configuration.
//!
//! A [`JobConfig`] is read from a TOML file (every key optional, see the
//! defaults below), overridden field by field from the command line, and
//! checked with [`JobConfig::validate`] before any input is read. All time
//! values are milliseconds.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::channel::DEFAULT_CHANNEL_CAPACITY;
use crate::error::ConfigError;
use crate::sink::RetryPolicy;
use crate::state::MissingValuePolicy;
use crate::window::{offset_for_weekday, TumblingWindows, WEEK_MS};

/// Where finalized results go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkType {
    /// Append-only JSON lines.
    #[default]
    File,
    /// SQLite table keyed by school and week.
    UpsertDb,
}

/// What to do with input that does not decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeErrorPolicy {
    /// Log, count and continue.
    #[default]
    Skip,
    /// Stop the job.
    Fail,
}

/// What happens to open windows when bounded input runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndOfInput {
    /// Advance the watermark to the end of time and emit every open window.
    #[default]
    Flush,
    /// Leave open windows open (checkpointed if a path is configured).
    Hold,
}

/// How the ingest stage spreads records over partition workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Partitioning {
    #[default]
    RoundRobin,
    /// ahash of the event id (plus key and timestamp).
    Hash,
}

macro_rules! impl_from_str {
    ($ty:ty, $option:literal, { $($name:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(ConfigError::UnknownValue {
                        option: $option,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

impl_from_str!(SinkType, "sink_type", {
    "file" => SinkType::File,
    "upsert-db" => SinkType::UpsertDb,
});
impl_from_str!(DecodeErrorPolicy, "on_decode_error", {
    "skip" => DecodeErrorPolicy::Skip,
    "fail" => DecodeErrorPolicy::Fail,
});
impl_from_str!(EndOfInput, "end_of_input", {
    "flush" => EndOfInput::Flush,
    "hold" => EndOfInput::Hold,
});
impl_from_str!(Partitioning, "partitioning", {
    "round-robin" => Partitioning::RoundRobin,
    "hash" => Partitioning::Hash,
});

/// Complete configuration of one aggregation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    /// Input path, or `-` for stdin.
    pub input: String,
    pub window_length_ms: i64,
    pub epoch_offset_ms: i64,
    /// Weekday the windows start on. Overrides `epoch_offset_ms`.
    pub week_start: Option<String>,
    pub out_of_orderness_ms: i64,
    pub sink_type: SinkType,
    pub sink_target: String,
    pub sink_batch_size: usize,
    pub sink_max_attempts: u32,
    pub sink_initial_backoff_ms: u64,
    pub sink_max_backoff_ms: u64,
    pub parallelism: usize,
    pub partitioning: Partitioning,
    pub channel_capacity: usize,
    pub on_decode_error: DecodeErrorPolicy,
    pub missing_value: MissingValuePolicy,
    pub end_of_input: EndOfInput,
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input: "-".to_string(),
            window_length_ms: WEEK_MS,
            epoch_offset_ms: 0,
            week_start: None,
            out_of_orderness_ms: 10 * 60 * 1000,
            sink_type: SinkType::File,
            sink_target: String::new(),
            sink_batch_size: 1000,
            sink_max_attempts: 5,
            sink_initial_backoff_ms: 100,
            sink_max_backoff_ms: 5_000,
            parallelism: 1,
            partitioning: Partitioning::RoundRobin,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            on_decode_error: DecodeErrorPolicy::Skip,
            missing_value: MissingValuePolicy::Zero,
            end_of_input: EndOfInput::Flush,
            checkpoint_path: None,
        }
    }
}

impl JobConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every option. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window_assigner()?;
        if self.out_of_orderness_ms < 0 {
            return Err(ConfigError::NegativeOutOfOrderness(self.out_of_orderness_ms));
        }
        if self.sink_batch_size == 0 {
            return Err(ConfigError::MustBePositive("sink_batch_size"));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::MustBePositive("parallelism"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::MustBePositive("channel_capacity"));
        }
        if self.sink_max_attempts == 0 {
            return Err(ConfigError::MustBePositive("sink_max_attempts"));
        }
        if self.sink_initial_backoff_ms > self.sink_max_backoff_ms {
            return Err(ConfigError::InvalidBackoff {
                initial_ms: self.sink_initial_backoff_ms,
                max_ms: self.sink_max_backoff_ms,
            });
        }
        if self.sink_target.trim().is_empty() {
            return Err(ConfigError::MissingSinkTarget);
        }
        Ok(())
    }

    /// Epoch offset after applying `week_start`.
    pub fn effective_epoch_offset(&self) -> Result<i64, ConfigError> {
        match &self.week_start {
            Some(day) => {
                let day = Weekday::from_str(day.trim())
                    .map_err(|_| ConfigError::UnknownWeekday(day.clone()))?;
                Ok(offset_for_weekday(day))
            }
            None => Ok(self.epoch_offset_ms),
        }
    }

    pub fn window_assigner(&self) -> Result<TumblingWindows, ConfigError> {
        TumblingWindows::new(self.window_length_ms, self.effective_epoch_offset()?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sink_max_attempts,
            initial_backoff: Duration::from_millis(self.sink_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.sink_max_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> JobConfig {
        JobConfig {
            sink_target: "out.jsonl".to_string(),
            ..JobConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.window_length_ms, 7 * 24 * 60 * 60 * 1000);
        assert_eq!(config.out_of_orderness_ms, 600_000);
        assert_eq!(config.sink_batch_size, 1000);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        // No sink target yet.
        assert_eq!(config.validate(), Err(ConfigError::MissingSinkTarget));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = JobConfig::from_toml_str(
            r#"
            input = "events.jsonl"
            week_start = "monday"
            out_of_orderness_ms = 0
            sink_type = "upsert-db"
            sink_target = "metrics.db"
            parallelism = 4
            partitioning = "hash"
            on_decode_error = "fail"
            missing_value = "exclude"
            end_of_input = "hold"
            checkpoint_path = "state.ckpt"
            "#,
        )
        .unwrap();

        assert_eq!(config.input, "events.jsonl");
        assert_eq!(config.sink_type, SinkType::UpsertDb);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.partitioning, Partitioning::Hash);
        assert_eq!(config.on_decode_error, DecodeErrorPolicy::Fail);
        assert_eq!(config.missing_value, MissingValuePolicy::Exclude);
        assert_eq!(config.end_of_input, EndOfInput::Hold);
        assert_eq!(config.checkpoint_path, Some(PathBuf::from("state.ckpt")));
        assert_eq!(config.effective_epoch_offset().unwrap(), 4 * 24 * 60 * 60 * 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = JobConfig::from_toml_str("window_size = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            (JobConfig { window_length_ms: 0, ..valid() }, ConfigError::InvalidWindowLength(0)),
            (
                JobConfig { epoch_offset_ms: WEEK_MS, ..valid() },
                ConfigError::InvalidEpochOffset { offset: WEEK_MS, window_length: WEEK_MS },
            ),
            (JobConfig { out_of_orderness_ms: -1, ..valid() }, ConfigError::NegativeOutOfOrderness(-1)),
            (JobConfig { sink_batch_size: 0, ..valid() }, ConfigError::MustBePositive("sink_batch_size")),
            (JobConfig { parallelism: 0, ..valid() }, ConfigError::MustBePositive("parallelism")),
            (
                JobConfig { week_start: Some("someday".into()), ..valid() },
                ConfigError::UnknownWeekday("someday".into()),
            ),
            (
                JobConfig { sink_initial_backoff_ms: 10, sink_max_backoff_ms: 1, ..valid() },
                ConfigError::InvalidBackoff { initial_ms: 10, max_ms: 1 },
            ),
        ];
        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }

    #[test]
    fn test_week_start_needs_week_sized_window() {
        // Monday is 4 days after the epoch, which does not fit a 1-day window.
        let config = JobConfig {
            window_length_ms: 24 * 60 * 60 * 1000,
            week_start: Some("Mon".into()),
            ..valid()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidEpochOffset { .. })));
    }

    #[test]
    fn test_enum_from_str() {
        assert_eq!("upsert-db".parse::<SinkType>().unwrap(), SinkType::UpsertDb);
        assert_eq!("FILE".parse::<SinkType>().unwrap(), SinkType::File);
        assert_eq!("skip".parse::<DecodeErrorPolicy>().unwrap(), DecodeErrorPolicy::Skip);
        assert_eq!("flush".parse::<EndOfInput>().unwrap(), EndOfInput::Flush);
        assert_eq!("round-robin".parse::<Partitioning>().unwrap(), Partitioning::RoundRobin);
        assert_eq!(
            "postgres".parse::<SinkType>(),
            Err(ConfigError::UnknownValue {
                option: "sink_type",
                value: "postgres".to_string()
            })
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = JobConfig::load("/nonexistent/accessmetrics.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
