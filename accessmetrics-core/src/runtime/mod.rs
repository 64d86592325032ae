//! Job execution: record sources, partitioning, the staged pipeline, and
//! the counters and shutdown signal shared between stages.

pub mod metrics;
pub mod partitioner;
pub mod pipeline;
pub mod shutdown;
pub mod source;

pub use metrics::*;
pub use partitioner::*;
pub use pipeline::*;
pub use shutdown::*;
pub use source::*;

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
