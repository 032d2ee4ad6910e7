//! Context document schema

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Collection name for contexts
pub const CONTEXT_COLLECTION: &str = "contexts";

/// Token count as found in stored documents
///
/// Older writers stored counts as strings; pipelines convert them with
/// conversion failures counted as zero.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum TokenCount {
    Count(i64),
    Text(String),
}

/// Context document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContextDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Department the question was routed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<TokenCount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<TokenCount>,
}
