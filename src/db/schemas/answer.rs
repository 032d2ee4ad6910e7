//! Answer document schema

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::TokenCount;

/// Collection name for answers
pub const ANSWER_COLLECTION: &str = "answers";

/// Known answer types
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerType {
    Normal,
    ClarifyingQuestion,
    PtMuni,
    NotGc,
}

impl AnswerType {
    /// All answer types, in the order listings rank them (lowest first)
    pub const ALL: [AnswerType; 4] = [
        AnswerType::Normal,
        AnswerType::ClarifyingQuestion,
        AnswerType::PtMuni,
        AnswerType::NotGc,
    ];

    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ClarifyingQuestion => "clarifying-question",
            Self::PtMuni => "pt-muni",
            Self::NotGc => "not-gc",
        }
    }
}

impl std::fmt::Display for AnswerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_type: Option<AnswerType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<TokenCount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<TokenCount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ObjectId>,
}
