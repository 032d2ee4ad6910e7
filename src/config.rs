//! Configuration for chat-metrics
//!
//! CLI arguments and environment variable handling using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::db::AggregateOptions;
use crate::filters::RequestParams;
use crate::pipeline::RetryPolicy;

/// Metric to compute in a one-shot run
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Every dashboard metric at once
    Dashboard,
    Usage,
    Sessions,
    Expert,
    Ai,
    PublicFeedback,
    Departments,
    /// One page of the chat listing
    Chats,
}

/// chat-metrics - read-only analytics over chat interaction logs
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-metrics")]
#[command(about = "Compute chat dashboard metrics from MongoDB or DocumentDB")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "chat-metrics")]
    pub mongodb_db: String,

    /// Enable development mode (falls back to the in-memory store)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JSON fixtures seeding the in-memory store
    #[arg(long, env = "FIXTURES")]
    pub fixtures: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Server-side limit for each aggregation in milliseconds
    #[arg(long, env = "QUERY_TIMEOUT_MS", default_value = "60000")]
    pub query_timeout_ms: u64,

    /// Retries after a low-memory failure
    #[arg(long, env = "RETRY_MAX", default_value = "2")]
    pub retry_max: u32,

    /// Delay before the first retry in milliseconds; doubles each retry
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value = "2000")]
    pub retry_base_delay_ms: u64,

    /// Metric to compute
    #[arg(long, value_enum, default_value = "dashboard")]
    pub metric: Metric,

    /// Request parameters
    #[command(flatten)]
    pub request: RequestArgs,
}

/// Request parameters of a one-shot run, named as in the query string
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// Start of the range, local time (YYYY-MM-DD[THH:MM[:SS]])
    #[arg(long)]
    pub start_date: Option<String>,

    /// End of the range, local time; a date alone covers the whole day
    #[arg(long)]
    pub end_date: Option<String>,

    /// Caller's offset from UTC in minutes, positive west of UTC
    #[arg(long, allow_hyphen_values = true)]
    pub timezone_offset_minutes: Option<String>,

    /// all, public, admin or referredPublic
    #[arg(long)]
    pub user_type: Option<String>,

    #[arg(long)]
    pub department: Option<String>,

    #[arg(long)]
    pub referring_url: Option<String>,

    #[arg(long)]
    pub url_en: Option<String>,

    #[arg(long)]
    pub url_fr: Option<String>,

    /// Comma-separated answer types, or all
    #[arg(long)]
    pub answer_type: Option<String>,

    /// Comma-separated categories, noEval, or all
    #[arg(long)]
    pub partner_eval: Option<String>,

    /// Comma-separated categories, noEval, or all
    #[arg(long)]
    pub ai_eval: Option<String>,

    #[arg(long)]
    pub skip_user_condition: Option<String>,

    /// Cursor page size
    #[arg(long)]
    pub limit: Option<String>,

    /// Cursor: only chats with a smaller id
    #[arg(long)]
    pub last_id: Option<String>,

    /// Table offset
    #[arg(long)]
    pub start: Option<String>,

    /// Table page size; switches the listing to table mode
    #[arg(long)]
    pub length: Option<String>,

    #[arg(long)]
    pub order_by: Option<String>,

    /// asc or desc
    #[arg(long)]
    pub order_dir: Option<String>,

    #[arg(long)]
    pub draw: Option<String>,

    /// Substring of the chat id
    #[arg(long)]
    pub search: Option<String>,
}

impl From<RequestArgs> for RequestParams {
    fn from(args: RequestArgs) -> Self {
        Self {
            start_date: args.start_date,
            end_date: args.end_date,
            timezone_offset_minutes: args.timezone_offset_minutes,
            user_type: args.user_type,
            department: args.department,
            referring_url: args.referring_url,
            url_en: args.url_en,
            url_fr: args.url_fr,
            answer_type: args.answer_type,
            partner_eval: args.partner_eval,
            ai_eval: args.ai_eval,
            skip_user_condition: args.skip_user_condition,
            limit: args.limit,
            last_id: args.last_id,
            start: args.start,
            length: args.length,
            order_by: args.order_by,
            order_dir: args.order_dir,
            draw: args.draw,
            search: args.search,
        }
    }
}

impl Args {
    /// Retry policy for aggregations
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_max,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// Options applied to every aggregation
    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            allow_disk_use: true,
            max_time: Some(Duration::from_millis(self.query_timeout_ms)),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.query_timeout_ms == 0 {
            return Err("QUERY_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.retry_max > 0 && self.retry_base_delay_ms == 0 {
            return Err("RETRY_BASE_DELAY_MS must be greater than zero when retries are enabled".to_string());
        }

        if self.fixtures.is_some() && !self.dev_mode {
            return Err("FIXTURES is only used in development mode".to_string());
        }

        if self.mongodb_db.trim().is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }

        Ok(())
    }
}
