//! In-process document store
//!
//! Runs aggregation pipelines against collections held in memory. Used in
//! dev mode when MongoDB is unavailable and by the test suites. Stage and
//! operator coverage matches the DocumentDB subset; `$facet` is rejected.

mod expr;
mod query;
mod stages;
mod value;

pub use expr::{eval, Scope};

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::store::{AggregateOptions, DocumentStore};
use crate::types::{MetricsError, Result};

/// Document store backed by in-memory collections
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw document
    pub async fn insert_document(&self, collection: &str, doc: Document) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    /// Serialize and insert a schema value
    pub async fn insert<T: Serialize>(&self, collection: &str, item: &T) -> Result<()> {
        let doc = bson::to_document(item)?;
        self.insert_document(collection, doc).await;
        Ok(())
    }

    /// Number of documents in a collection
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Load collections from a JSON fixtures file
    ///
    /// The file maps collection names to arrays of extended-JSON documents,
    /// e.g. `{"chats": [{"_id": {"$oid": "..."}, ...}]}`.
    pub async fn from_fixtures(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let store = Self::from_fixture_json(&raw)?;
        info!(path = %path.display(), "Loaded fixtures into memory store");
        Ok(store)
    }

    /// Parse fixtures from a JSON string
    pub fn from_fixture_json(raw: &str) -> Result<Self> {
        let parsed: serde_json::Value = serde_json::from_str(raw)?;
        let serde_json::Value::Object(map) = parsed else {
            return Err(MetricsError::Config(
                "fixtures must be an object of collection arrays".into(),
            ));
        };

        let mut collections = HashMap::new();
        for (name, entries) in map {
            let serde_json::Value::Array(entries) = entries else {
                return Err(MetricsError::Config(format!(
                    "fixture collection '{}' must be an array",
                    name
                )));
            };
            let mut docs = Vec::with_capacity(entries.len());
            for entry in entries {
                match Bson::try_from(entry) {
                    Ok(Bson::Document(doc)) => docs.push(doc),
                    Ok(_) => {
                        return Err(MetricsError::Config(format!(
                            "fixture entries in '{}' must be objects",
                            name
                        )))
                    }
                    Err(e) => {
                        return Err(MetricsError::Config(format!(
                            "invalid extended JSON in '{}': {}",
                            name, e
                        )))
                    }
                }
            }
            collections.insert(name, docs);
        }

        Ok(Self {
            collections: RwLock::new(collections),
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        _options: AggregateOptions,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let input = collections.get(collection).cloned().unwrap_or_default();
        debug!(
            collection,
            stages = pipeline.len(),
            input = input.len(),
            "Running in-memory aggregation"
        );
        stages::run_pipeline(input, &pipeline, &collections)
    }
}
