//! Tool call document schema

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Collection name for tool calls
pub const TOOL_COLLECTION: &str = "tools";

/// One tool invocation made while producing an answer
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Tool name
    pub tool: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}
