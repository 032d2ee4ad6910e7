//! Expert and AI eval metrics
//!
//! Both count verdicts per category with a language split. Expert metrics
//! read the interaction's own feedback; AI metrics read the feedback
//! referenced by its automated eval.

use bson::{bson, doc, Document};
use serde::{Deserialize, Serialize};

use super::common::{insert_lang_counts, LangCount};
use crate::categorizer::Category;
use crate::db::schemas::CHAT_COLLECTION;
use crate::filters::{Fragment, MetricsRequest};
use crate::pipeline::{Executor, Join, PipelineBuilder};
use crate::types::Result;

/// Which verdict to count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalSource {
    Expert,
    Ai,
}

impl EvalSource {
    fn join(&self) -> Join {
        match self {
            EvalSource::Expert => Join::ExpertFeedback,
            EvalSource::Ai => Join::AutoEval,
        }
    }

    fn feedback_field(&self) -> &'static str {
        match self {
            EvalSource::Expert => "expertFeedbackId",
            EvalSource::Ai => "aiFeedbackId",
        }
    }

    fn verdict_field(&self) -> &'static str {
        match self {
            EvalSource::Expert => "$partnerEval",
            EvalSource::Ai => "$aiEval",
        }
    }
}

/// Scored interactions by verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub total: LangCount,
    pub correct: LangCount,
    pub needs_improvement: LangCount,
    pub has_error: LangCount,
    pub has_citation_error: LangCount,
    pub harmful: LangCount,
}

impl CategoryCounts {
    fn from_group(doc: &Document) -> Self {
        let of = |category: Category| LangCount::from_group(doc, category.as_str());
        Self {
            total: LangCount::from_group(doc, "total"),
            correct: of(Category::Correct),
            needs_improvement: of(Category::NeedsImprovement),
            has_error: of(Category::HasError),
            has_citation_error: of(Category::HasCitationError),
            harmful: of(Category::Harmful),
        }
    }

    pub fn get(&self, category: Category) -> LangCount {
        match category {
            Category::Correct => self.correct,
            Category::NeedsImprovement => self.needs_improvement,
            Category::HasError => self.has_error,
            Category::HasCitationError => self.has_citation_error,
            Category::Harmful => self.harmful,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertEvalMetrics {
    pub expert_scored: CategoryCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiEvalMetrics {
    pub ai_scored: CategoryCounts,
}

pub fn pipeline(request: &MetricsRequest, source: EvalSource) -> Vec<Document> {
    let scored = Fragment::new(
        source.join(),
        doc! { source.feedback_field(): { "$ne": null } },
    );
    let mut stages = PipelineBuilder::new(request.range)
        .with_filters(&request.filters)
        .with_fragment(scored)
        .build();

    let mut group = doc! { "_id": null };
    insert_lang_counts(&mut group, "total", None);
    for category in Category::ALL {
        insert_lang_counts(
            &mut group,
            category.as_str(),
            Some(bson!({ "$eq": [source.verdict_field(), category.as_str()] })),
        );
    }
    stages.push(doc! { "$group": group });
    stages
}

pub async fn fetch(
    executor: &Executor,
    request: &MetricsRequest,
    source: EvalSource,
) -> Result<CategoryCounts> {
    let result = executor
        .aggregate(CHAT_COLLECTION, pipeline(request, source))
        .await?;
    Ok(result
        .first()
        .map(CategoryCounts::from_group)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{DateRange, FilterSpec};
    use chrono::Utc;

    fn lookups(stages: &[Document]) -> Vec<String> {
        stages
            .iter()
            .filter_map(|s| s.get_document("$lookup").ok())
            .map(|l| l.get_str("from").unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_each_source_joins_only_its_feedback() {
        let request = MetricsRequest::new(
            DateRange::default_window(Utc::now()),
            FilterSpec::default(),
        );
        assert_eq!(
            lookups(&pipeline(&request, EvalSource::Expert)),
            vec!["interactions", "expertfeedbacks"]
        );
        assert_eq!(
            lookups(&pipeline(&request, EvalSource::Ai)),
            vec!["interactions", "evals", "expertfeedbacks"]
        );
    }

    #[test]
    fn test_output_shape() {
        let json = serde_json::to_value(ExpertEvalMetrics::default()).unwrap();
        assert_eq!(json["expertScored"]["hasCitationError"]["en"], 0);
        let json = serde_json::to_value(AiEvalMetrics::default()).unwrap();
        assert_eq!(json["aiScored"]["total"]["total"], 0);
    }
}
