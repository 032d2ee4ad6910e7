//! chat-metrics - analytics core for a chat assistant's interaction logs
//!
//! Computes dashboard metrics (usage, sessions, expert and AI evaluation,
//! public feedback, departments) and the paginated chat listing from chat
//! records stored in MongoDB or DocumentDB. Every metric is a single
//! aggregation pipeline assembled from typed filters, with joins added only
//! when a filter or output needs them.

pub mod categorizer;
pub mod config;
pub mod db;
pub mod filters;
pub mod metrics;
pub mod pipeline;
pub mod types;

pub use config::Args;
pub use metrics::{DashboardMetrics, MetricsService};
pub use types::{MetricsError, Result};
