use std::collections::BTreeSet;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::record::EventRecord;
use crate::state::{Accumulator, AccumulatorStore, AggregateResult, MissingValuePolicy};
use crate::time::{WatermarkTracker, EVENT_TIME_MAX};
use crate::types::{EventTime, GroupKey, Watermark};

mod assigners;
mod emitter;
mod operator;
mod primitives;

pub use assigners::*;
pub use emitter::*;
pub use operator::*;
pub use primitives::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
