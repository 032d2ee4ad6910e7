//! Retrying aggregation executor
//!
//! Runs a pipeline against a `DocumentStore`, retrying with exponential
//! backoff when the engine reports low memory. Every other failure is
//! logged and returned as is.

use std::sync::Arc;
use std::time::Duration;

use bson::Document;
use tracing::{debug, error, warn};

use crate::db::{AggregateOptions, DocumentStore};
use crate::types::Result;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Executes aggregations with the retry policy applied
#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    options: AggregateOptions,
}

impl Executor {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy, options: AggregateOptions) -> Self {
        Self {
            store,
            policy,
            options,
        }
    }

    /// Run `pipeline` against `collection`
    pub async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let mut attempt = 0;
        loop {
            debug!(collection, stages = pipeline.len(), attempt, "Running aggregation");
            match self
                .store
                .aggregate(collection, pipeline.clone(), self.options.clone())
                .await
            {
                Ok(docs) => return Ok(docs),
                Err(e) if e.is_low_memory() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        collection,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Aggregation hit low memory, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(collection, attempt, error = %e, "Aggregation failed");
                    return Err(e);
                }
            }
        }
    }
}
