use serde::{Deserialize, Serialize};

use crate::types::{EventTime, Watermark};

mod aligner;
mod watermark;

pub use aligner::*;
pub use watermark::*;

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
