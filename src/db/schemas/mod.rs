//! Database schemas for chat metrics
//!
//! Document shapes of the collections the aggregation pipelines read.
//! The persistence layer that writes them lives elsewhere.

mod answer;
mod chat;
mod citation;
mod context;
mod eval;
mod feedback;
mod interaction;
mod tool;

pub use answer::{AnswerDoc, AnswerType, ANSWER_COLLECTION};
pub use chat::{ChatDoc, CHAT_COLLECTION};
pub use citation::{CitationDoc, CITATION_COLLECTION};
pub use context::{ContextDoc, TokenCount, CONTEXT_COLLECTION};
pub use eval::{EvalDoc, EVAL_COLLECTION};
pub use feedback::{
    ExpertFeedbackDoc, PublicFeedbackDoc, EXPERT_FEEDBACK_COLLECTION, PUBLIC_FEEDBACK_COLLECTION,
};
pub use interaction::{InteractionDoc, INTERACTION_COLLECTION};
pub use tool::{ToolDoc, TOOL_COLLECTION};
