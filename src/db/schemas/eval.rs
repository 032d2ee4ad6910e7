//! Eval document schema
//!
//! An automated evaluation; its verdict is an ExpertFeedback document
//! produced by the evaluator rather than by a partner.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Collection name for automated evals
pub const EVAL_COLLECTION: &str = "evals";

/// Eval document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct EvalDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Feedback produced by the evaluator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expert_feedback: Option<ObjectId>,
}
