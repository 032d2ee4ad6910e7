//! Per-metric aggregators
//!
//! Each submodule builds its pipeline on the shared row pipeline, appends
//! its grouping stages and maps the result onto a typed output whose
//! default is all zeros. `MetricsService` ties them to a store.

pub mod chat_listing;
pub mod common;
pub mod departments;
pub mod evals;
pub mod public_feedback;
pub mod sessions;
pub mod usage;

pub use chat_listing::{ChatListing, ChatRow, ListingPage};
pub use common::LangCount;
pub use departments::{ByDepartment, DepartmentMetrics, DepartmentReport, DepartmentScores};
pub use evals::{AiEvalMetrics, CategoryCounts, EvalSource, ExpertEvalMetrics};
pub use public_feedback::{PublicFeedbackMetrics, PublicFeedbackReasons, PublicFeedbackTotals};
pub use sessions::{SessionMetrics, SessionsByQuestionCount};
pub use usage::UsageMetrics;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::db::{AggregateOptions, DocumentStore};
use crate::filters::{ListingParams, MetricsRequest};
use crate::pipeline::{Executor, RetryPolicy};
use crate::types::Result;

/// Every dashboard metric for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub usage: UsageMetrics,
    pub sessions: SessionMetrics,
    pub expert: ExpertEvalMetrics,
    pub ai: AiEvalMetrics,
    pub public_feedback: PublicFeedbackMetrics,
    pub departments: DepartmentReport,
}

/// Read-only metrics over a document store
#[derive(Clone)]
pub struct MetricsService {
    executor: Executor,
}

impl MetricsService {
    /// Service with the default retry policy and aggregation options
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_executor(Executor::new(
            store,
            RetryPolicy::default(),
            AggregateOptions::default(),
        ))
    }

    pub fn with_executor(executor: Executor) -> Self {
        Self { executor }
    }

    pub async fn usage(&self, request: &MetricsRequest) -> Result<UsageMetrics> {
        let start = Instant::now();
        let metrics = usage::fetch(&self.executor, request).await?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Usage metrics computed");
        Ok(metrics)
    }

    pub async fn sessions(&self, request: &MetricsRequest) -> Result<SessionMetrics> {
        let start = Instant::now();
        let metrics = sessions::fetch(&self.executor, request).await?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Session metrics computed");
        Ok(metrics)
    }

    pub async fn expert_eval(&self, request: &MetricsRequest) -> Result<ExpertEvalMetrics> {
        let start = Instant::now();
        let expert_scored = evals::fetch(&self.executor, request, EvalSource::Expert).await?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Expert eval metrics computed");
        Ok(ExpertEvalMetrics { expert_scored })
    }

    pub async fn ai_eval(&self, request: &MetricsRequest) -> Result<AiEvalMetrics> {
        let start = Instant::now();
        let ai_scored = evals::fetch(&self.executor, request, EvalSource::Ai).await?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "AI eval metrics computed");
        Ok(AiEvalMetrics { ai_scored })
    }

    pub async fn public_feedback(&self, request: &MetricsRequest) -> Result<PublicFeedbackMetrics> {
        let start = Instant::now();
        let metrics = public_feedback::fetch(&self.executor, request).await?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Public feedback metrics computed");
        Ok(metrics)
    }

    pub async fn departments(&self, request: &MetricsRequest) -> Result<DepartmentReport> {
        let start = Instant::now();
        let report = departments::fetch(&self.executor, request).await?;
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            departments = report.by_department.len(),
            "Department metrics computed"
        );
        Ok(report)
    }

    pub async fn chat_listing(
        &self,
        request: &MetricsRequest,
        listing: &ListingParams,
    ) -> Result<ChatListing> {
        let start = Instant::now();
        let page = chat_listing::fetch(&self.executor, request, listing).await?;
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            rows = page.rows.len(),
            total = page.pagination.total_count,
            "Chat listing computed"
        );
        Ok(page)
    }

    /// Run every dashboard metric concurrently
    pub async fn dashboard(&self, request: &MetricsRequest) -> Result<DashboardMetrics> {
        let (usage, sessions, expert, ai, public_feedback, departments) = tokio::try_join!(
            self.usage(request),
            self.sessions(request),
            self.expert_eval(request),
            self.ai_eval(request),
            self.public_feedback(request),
            self.departments(request),
        )?;

        Ok(DashboardMetrics {
            usage,
            sessions,
            expert,
            ai,
            public_feedback,
            departments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::*;
    use crate::db::MemoryStore;
    use crate::filters::{DateRange, FilterSpec};
    use bson::oid::ObjectId;
    use chrono::{TimeZone, Utc};

    fn range() -> DateRange {
        DateRange {
            gte: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            lte: Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap(),
        }
    }

    async fn seed_chat(store: &MemoryStore, lang: &str, questions: usize) {
        let created = bson::DateTime::from_chrono(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap());
        let mut chat = ChatDoc::new(ObjectId::new().to_hex(), lang, created);
        for _ in 0..questions {
            let interaction = InteractionDoc::new();
            chat = chat.with_interaction(interaction.id.unwrap());
            store.insert(INTERACTION_COLLECTION, &interaction).await.unwrap();
        }
        store.insert(CHAT_COLLECTION, &chat).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_store_yields_zero_defaults() {
        let service = MetricsService::new(Arc::new(MemoryStore::new()));
        let request = MetricsRequest::new(range(), FilterSpec::default());
        let dashboard = service.dashboard(&request).await.unwrap();
        assert_eq!(dashboard, DashboardMetrics::default());
    }

    #[tokio::test]
    async fn test_dashboard_counts_questions_and_sessions() {
        let store = MemoryStore::new();
        seed_chat(&store, "en", 1).await;
        seed_chat(&store, "fr", 2).await;
        seed_chat(&store, "en", 4).await;
        seed_chat(&store, "en", 0).await;

        let service = MetricsService::new(Arc::new(store));
        let request = MetricsRequest::new(range(), FilterSpec::default());
        let dashboard = service.dashboard(&request).await.unwrap();

        assert_eq!(dashboard.usage.total_questions, 7);
        assert_eq!(dashboard.usage.total_questions_fr, 2);
        assert_eq!(dashboard.usage.answer_type(AnswerType::Normal).total, 7);

        let sessions = dashboard.sessions;
        assert_eq!(sessions.total_conversations, 4);
        assert_eq!(sessions.total_conversations_en, 3);
        let buckets = sessions.sessions_by_question_count;
        assert_eq!(buckets.single_question.total, 1);
        assert_eq!(buckets.two_questions.fr, 1);
        assert_eq!(buckets.three_questions.en, 1);

        assert_eq!(dashboard.departments.by_department.get("Unknown").unwrap().total, 7);
    }
}
