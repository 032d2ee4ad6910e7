//! Interaction document schema
//!
//! One question/answer turn. Every reference is weak: the referenced
//! documents are shared and owned independently.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Collection name for interactions
pub const INTERACTION_COLLECTION: &str = "interactions";

/// Interaction document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct InteractionDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Page the user was on before asking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referring_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<ObjectId>,

    /// Partner/expert evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expert_feedback: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_feedback: Option<ObjectId>,

    /// Automated evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_eval: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl InteractionDoc {
    /// Create an interaction with a fresh ID and no references
    pub fn new() -> Self {
        Self {
            id: Some(ObjectId::new()),
            ..Default::default()
        }
    }
}
