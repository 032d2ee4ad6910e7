//! Shared types for chat metrics

pub mod error;

pub use error::{MetricsError, Result, LOW_MEMORY_CODE};
