//! # AccessMetrics Core
//!
//! Event-time aggregation of school accessibility reports into weekly
//! per-school metrics.
//!
//! - [`record`]: decoding of raw JSON events into [`EventRecord`]s.
//! - [`time`]: the bounded out-of-orderness [`WatermarkTracker`](time::WatermarkTracker)
//!   and the per-partition [`WatermarkAligner`](time::WatermarkAligner).
//! - [`window`]: tumbling window assignment, firing and the single-threaded
//!   [`WindowOperator`].
//! - [`state`]: mergeable [`Accumulator`]s and the per-window store.
//! - [`sink`]: JSON-lines and SQLite upsert sinks behind a batching, retrying
//!   [`SinkWriter`](sink::SinkWriter).
//! - [`runtime`]: the staged [`Pipeline`] and [`run_job`].
//! - [`config`], [`checkpoint`], [`channel`], [`input_gate`]: job plumbing.

pub mod channel;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod input_gate;
pub mod record;
pub mod runtime;
pub mod sink;
pub mod state;
pub mod time;
pub mod types;
pub mod window;

pub use config::JobConfig;
pub use record::EventRecord;
pub use runtime::{run_job, JobSummary, Pipeline, ShutdownSignal};
pub use state::{Accumulator, AggregateResult};
pub use window::WindowOperator;
