//! Session metrics: chats bucketed by question count
//!
//! Without interaction filters every chat in range is counted by its raw
//! interaction count, including chats with none. With filters, only the
//! matching interactions of a chat are counted.

use bson::{bson, doc, Document};
use serde::{Deserialize, Serialize};

use super::common::{count, insert_lang_counts, LangCount};
use crate::db::schemas::CHAT_COLLECTION;
use crate::filters::MetricsRequest;
use crate::pipeline::{Executor, PipelineBuilder};
use crate::types::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsByQuestionCount {
    pub single_question: LangCount,
    pub two_questions: LangCount,
    /// Three or more
    pub three_questions: LangCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub total_conversations: i64,
    pub total_conversations_en: i64,
    pub total_conversations_fr: i64,
    pub sessions_by_question_count: SessionsByQuestionCount,
}

impl SessionMetrics {
    fn from_group(doc: &Document) -> Self {
        Self {
            total_conversations: count(doc, "totalConversations"),
            total_conversations_en: count(doc, "totalConversationsEn"),
            total_conversations_fr: count(doc, "totalConversationsFr"),
            sessions_by_question_count: SessionsByQuestionCount {
                single_question: LangCount::from_group(doc, "singleQuestion"),
                two_questions: LangCount::from_group(doc, "twoQuestions"),
                three_questions: LangCount::from_group(doc, "threeQuestions"),
            },
        }
    }
}

pub fn pipeline(request: &MetricsRequest) -> Vec<Document> {
    let builder = PipelineBuilder::new(request.range).with_filters(&request.filters);

    let mut stages = if request.filters.has_interaction_filters() {
        let mut stages = builder.build();
        stages.push(doc! {
            "$group": {
                "_id": "$_id",
                "pageLanguage": { "$first": "$pageLanguage" },
                "questionCount": { "$sum": 1 },
            }
        });
        stages
    } else {
        vec![
            doc! { "$match": builder.chat_match() },
            doc! {
                "$project": {
                    "pageLanguage": 1,
                    "questionCount": { "$size": { "$ifNull": ["$interactions", []] } },
                }
            },
        ]
    };

    let mut group = doc! { "_id": null };
    insert_lang_counts(&mut group, "totalConversations", None);
    insert_lang_counts(
        &mut group,
        "singleQuestion",
        Some(bson!({ "$eq": ["$questionCount", 1] })),
    );
    insert_lang_counts(
        &mut group,
        "twoQuestions",
        Some(bson!({ "$eq": ["$questionCount", 2] })),
    );
    insert_lang_counts(
        &mut group,
        "threeQuestions",
        Some(bson!({ "$gte": ["$questionCount", 3] })),
    );
    stages.push(doc! { "$group": group });
    stages
}

pub async fn fetch(executor: &Executor, request: &MetricsRequest) -> Result<SessionMetrics> {
    let result = executor.aggregate(CHAT_COLLECTION, pipeline(request)).await?;
    Ok(result
        .first()
        .map(SessionMetrics::from_group)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{DateRange, FilterSpec};
    use chrono::Utc;

    fn request(filters: FilterSpec) -> MetricsRequest {
        MetricsRequest::new(DateRange::default_window(Utc::now()), filters)
    }

    #[test]
    fn test_unfiltered_path_skips_joins() {
        let stages = pipeline(&request(FilterSpec::default()));
        assert!(stages.iter().all(|s| !s.contains_key("$lookup")));
        assert_eq!(stages.len(), 3);
    }

    #[test]
    fn test_filtered_path_counts_matching_interactions() {
        let filters = FilterSpec {
            department: Some("CRA".into()),
            ..Default::default()
        };
        let stages = pipeline(&request(filters));
        let lookups = stages.iter().filter(|s| s.contains_key("$lookup")).count();
        assert_eq!(lookups, 2);
        let groups = stages.iter().filter(|s| s.contains_key("$group")).count();
        assert_eq!(groups, 2);
    }
}
