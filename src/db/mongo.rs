//! MongoDB and DocumentDB store

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{options::ClientOptions, Client, Database};
use tracing::{debug, info};

use crate::db::store::{AggregateOptions, DocumentStore};
use crate::types::{MetricsError, Result};

/// Server selection and connect timeout; an unreachable server fails fast
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Aggregations against one database
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect and ping `db_name`
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| MetricsError::store(format!("Invalid MongoDB URI: {}", e)))?;
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.app_name.get_or_insert_with(|| "chat-metrics".to_string());

        let client = Client::with_options(options)
            .map_err(|e| MetricsError::store(format!("Failed to create MongoDB client: {}", e)))?;
        let db = client.database(db_name);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| MetricsError::store(format!("MongoDB ping failed: {}", e)))?;

        info!(db = db_name, "Connected to MongoDB");
        Ok(Self { db })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Result<Vec<Document>> {
        debug!(collection, stages = pipeline.len(), "Running aggregation");

        let coll = self.db.collection::<Document>(collection);
        let mut action = coll
            .aggregate(pipeline)
            .allow_disk_use(options.allow_disk_use);
        if let Some(max_time) = options.max_time {
            action = action.max_time(max_time);
        }

        let cursor = action.await?;
        Ok(cursor.try_collect().await?)
    }
}
