//! Per-window aggregation state.
//!
//! An [`Accumulator`] is the running aggregate of one `(key, window)` cell.
//! The [`AccumulatorStore`] owns every open cell and hands closed ones to the
//! emitter exactly once.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::record::EventRecord;
use crate::types::{EventTime, GroupKey, SchoolId, Watermark};
use crate::window::WindowId;

mod accumulator;
mod store;

pub use accumulator::*;
pub use store::*;

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
