//! Storage layer
//!
//! `DocumentStore` is the seam between pipeline assembly and execution.
//! `MongoStore` talks to MongoDB/DocumentDB; `MemoryStore` runs the same
//! pipelines in process for dev mode and tests.

pub mod memory;
pub mod mongo;
pub mod schemas;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use store::{AggregateOptions, DocumentStore};
