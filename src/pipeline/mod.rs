//! Aggregation pipeline construction and execution

pub mod builder;
pub mod retry;

pub use builder::{Join, PipelineBuilder};
pub use retry::{Executor, RetryPolicy};
