//! Store collaborator seam
//!
//! Everything above this trait builds pipelines; everything below executes
//! them. The pipeline vocabulary is restricted to what DocumentDB 5
//! accepts: single-field `$lookup`, no `$facet`, no `$$REMOVE`.

use async_trait::async_trait;
use bson::Document;
use std::time::Duration;

use crate::types::Result;

/// Options for a single aggregation call
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Let the engine spill to disk where supported
    pub allow_disk_use: bool,

    /// Server-side execution limit
    pub max_time: Option<Duration>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            allow_disk_use: true,
            max_time: None,
        }
    }
}

/// A document store that can execute aggregation pipelines
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run `pipeline` against `collection` and return every output document
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Result<Vec<Document>>;
}
