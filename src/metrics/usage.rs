//! Usage metrics: question totals, token sums and answer types

use std::collections::BTreeMap;

use bson::{bson, doc, Document};
use serde::{Deserialize, Serialize};

use super::common::{count, count_if, insert_lang_counts, insert_lang_sums, present, LangCount};
use crate::db::schemas::{AnswerType, CHAT_COLLECTION};
use crate::filters::MetricsRequest;
use crate::pipeline::{Executor, Join, PipelineBuilder};
use crate::types::Result;

/// Group field prefix for each answer type
const ANSWER_TYPE_KEYS: [(AnswerType, &str); 4] = [
    (AnswerType::Normal, "normalCount"),
    (AnswerType::ClarifyingQuestion, "clarifyingCount"),
    (AnswerType::PtMuni, "ptMuniCount"),
    (AnswerType::NotGc, "notGcCount"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetrics {
    pub total_questions: i64,
    pub total_questions_en: i64,
    pub total_questions_fr: i64,
    pub total_input_tokens: i64,
    pub total_input_tokens_en: i64,
    pub total_input_tokens_fr: i64,
    pub total_output_tokens: i64,
    pub total_output_tokens_en: i64,
    pub total_output_tokens_fr: i64,
    pub total_google_searches: i64,
    /// Answers that carry a citation URL
    pub total_citations: i64,
    pub total_tool_calls: i64,
    /// Keyed by answer type name
    pub answer_types: BTreeMap<String, LangCount>,
}

impl Default for UsageMetrics {
    fn default() -> Self {
        Self::from_group(&Document::new())
    }
}

impl UsageMetrics {
    fn from_group(doc: &Document) -> Self {
        let answer_types = ANSWER_TYPE_KEYS
            .iter()
            .map(|(kind, key)| (kind.to_string(), LangCount::from_group(doc, key)))
            .collect();

        Self {
            total_questions: count(doc, "totalQuestions"),
            total_questions_en: count(doc, "totalQuestionsEn"),
            total_questions_fr: count(doc, "totalQuestionsFr"),
            total_input_tokens: count(doc, "totalInputTokens"),
            total_input_tokens_en: count(doc, "totalInputTokensEn"),
            total_input_tokens_fr: count(doc, "totalInputTokensFr"),
            total_output_tokens: count(doc, "totalOutputTokens"),
            total_output_tokens_en: count(doc, "totalOutputTokensEn"),
            total_output_tokens_fr: count(doc, "totalOutputTokensFr"),
            total_google_searches: count(doc, "totalGoogleSearches"),
            total_citations: count(doc, "totalCitations"),
            total_tool_calls: count(doc, "totalToolCalls"),
            answer_types,
        }
    }

    /// Counts for one answer type
    pub fn answer_type(&self, kind: AnswerType) -> LangCount {
        self.answer_types
            .get(kind.as_str())
            .copied()
            .unwrap_or_default()
    }
}

pub fn pipeline(request: &MetricsRequest) -> Vec<Document> {
    let mut stages = PipelineBuilder::new(request.range)
        .with_filters(&request.filters)
        .require(Join::Context)
        .require(Join::Answer)
        .require(Join::Citation)
        .require(Join::Tools)
        .build();

    let mut group = doc! { "_id": null };
    insert_lang_counts(&mut group, "totalQuestions", None);
    insert_lang_sums(
        &mut group,
        "totalInputTokens",
        bson!({ "$add": ["$contextInputTokens", "$answerInputTokens"] }),
    );
    insert_lang_sums(
        &mut group,
        "totalOutputTokens",
        bson!({ "$add": ["$contextOutputTokens", "$answerOutputTokens"] }),
    );
    group.insert(
        "totalGoogleSearches",
        count_if(bson!({ "$eq": ["$searchProvider", "google"] })),
    );
    group.insert("totalCitations", count_if(present("$citationUrl")));
    group.insert("totalToolCalls", doc! { "$sum": "$toolCount" });
    for (kind, key) in ANSWER_TYPE_KEYS {
        insert_lang_counts(
            &mut group,
            key,
            Some(bson!({ "$eq": ["$answerType", kind.as_str()] })),
        );
    }

    stages.push(doc! { "$group": group });
    stages
}

pub async fn fetch(executor: &Executor, request: &MetricsRequest) -> Result<UsageMetrics> {
    let result = executor.aggregate(CHAT_COLLECTION, pipeline(request)).await?;
    Ok(result
        .first()
        .map(UsageMetrics::from_group)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_all_zero() {
        let usage = UsageMetrics::default();
        assert_eq!(usage.total_questions, 0);
        assert_eq!(usage.answer_types.len(), 4);
        assert_eq!(usage.total_citations, 0);
        assert_eq!(usage.answer_type(AnswerType::PtMuni), LangCount::default());
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(UsageMetrics::default()).unwrap();
        assert_eq!(json["totalQuestionsEn"], 0);
        assert_eq!(json["totalGoogleSearches"], 0);
        assert_eq!(json["totalToolCalls"], 0);
        assert_eq!(json["answerTypes"]["clarifying-question"]["fr"], 0);
        assert_eq!(json["answerTypes"]["not-gc"]["total"], 0);
    }
}
