//! Feedback document schemas
//!
//! Expert feedback is written by partners (or by the automated evaluator
//! through an Eval); public feedback is the yes/no vote of end users.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Collection name for expert feedback
pub const EXPERT_FEEDBACK_COLLECTION: &str = "expertfeedbacks";

/// Collection name for public feedback
pub const PUBLIC_FEEDBACK_COLLECTION: &str = "publicfeedbacks";

/// Expert feedback document stored in MongoDB
///
/// Sentence and total scores take 0, 80 or 100; citation scores take
/// 0, 20 or 25. Any field may be missing.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpertFeedbackDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence1_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence2_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence3_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence4_score: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence1_harmful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence2_harmful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence3_harmful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence4_harmful: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_score: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<i32>,
}

impl ExpertFeedbackDoc {
    /// Sentence scores in order
    pub fn sentence_scores(&self) -> [Option<i32>; 4] {
        [
            self.sentence1_score,
            self.sentence2_score,
            self.sentence3_score,
            self.sentence4_score,
        ]
    }

    /// Sentence harmful flags in order
    pub fn sentence_harmful(&self) -> [Option<bool>; 4] {
        [
            self.sentence1_harmful,
            self.sentence2_harmful,
            self.sentence3_harmful,
            self.sentence4_harmful,
        ]
    }
}

/// Public feedback document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublicFeedbackDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// "yes" or "no"
    pub feedback: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_feedback_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_feedback_score: Option<i32>,
}
