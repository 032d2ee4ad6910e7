//! Citation document schema

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Collection name for answer citations
pub const CITATION_COLLECTION: &str = "citations";

/// Citation attached to an answer
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CitationDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// URL the model cited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_citation_url: Option<String>,

    /// URL shown to the user after validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided_citation_url: Option<String>,
}
