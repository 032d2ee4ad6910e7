//! Public feedback metrics
//!
//! Totals and the two reason breakdowns run as three independent
//! aggregations, one after another, to keep peak engine memory low.

use std::collections::BTreeMap;

use bson::{bson, doc, Document};
use serde::{Deserialize, Serialize};

use super::common::{count, insert_lang_counts, key_text};
use crate::db::schemas::CHAT_COLLECTION;
use crate::filters::{Fragment, MetricsRequest};
use crate::pipeline::{Executor, Join, PipelineBuilder};
use crate::types::Result;

/// Reason reported when the user gave none
pub const OTHER_REASON: &str = "other";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFeedbackTotals {
    pub total_questions_with_feedback: i64,
    pub yes: i64,
    pub no: i64,
    pub en_yes: i64,
    pub en_no: i64,
    pub fr_yes: i64,
    pub fr_no: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicFeedbackReasons {
    pub yes: BTreeMap<String, i64>,
    pub no: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicFeedbackMetrics {
    pub public_feedback_totals: PublicFeedbackTotals,
    pub public_feedback_reasons: PublicFeedbackReasons,
}

fn base(request: &MetricsRequest) -> Vec<Document> {
    PipelineBuilder::new(request.range)
        .with_filters(&request.filters)
        .with_fragment(Fragment::new(
            Join::PublicFeedback,
            doc! { "publicFeedback": { "$ne": null } },
        ))
        .build()
}

pub fn totals_pipeline(request: &MetricsRequest) -> Vec<Document> {
    let mut group = doc! { "_id": null };
    insert_lang_counts(&mut group, "totalWithFeedback", None);
    insert_lang_counts(
        &mut group,
        "yesCount",
        Some(bson!({ "$eq": ["$publicFeedback", "yes"] })),
    );
    insert_lang_counts(
        &mut group,
        "noCount",
        Some(bson!({ "$eq": ["$publicFeedback", "no"] })),
    );

    let mut stages = base(request);
    stages.push(doc! { "$group": group });
    stages
}

/// Reason counts for one answer (`"yes"` or `"no"`)
pub fn reasons_pipeline(request: &MetricsRequest, answer: &str) -> Vec<Document> {
    let mut stages = base(request);
    stages.push(doc! { "$match": { "publicFeedback": answer } });
    stages.push(doc! {
        "$group": {
            "_id": { "$ifNull": ["$publicFeedbackReason", OTHER_REASON] },
            "count": { "$sum": 1 },
        }
    });
    stages
}

fn reason_counts(result: &[Document]) -> BTreeMap<String, i64> {
    let mut reasons = BTreeMap::new();
    for doc in result {
        let reason = doc.get("_id").map(key_text).unwrap_or_default();
        *reasons.entry(reason).or_insert(0) += count(doc, "count");
    }
    reasons
}

pub async fn fetch(executor: &Executor, request: &MetricsRequest) -> Result<PublicFeedbackMetrics> {
    let totals = executor
        .aggregate(CHAT_COLLECTION, totals_pipeline(request))
        .await?;
    let yes = executor
        .aggregate(CHAT_COLLECTION, reasons_pipeline(request, "yes"))
        .await?;
    let no = executor
        .aggregate(CHAT_COLLECTION, reasons_pipeline(request, "no"))
        .await?;

    let totals = totals
        .first()
        .map(|doc| PublicFeedbackTotals {
            total_questions_with_feedback: count(doc, "totalWithFeedback"),
            yes: count(doc, "yesCount"),
            no: count(doc, "noCount"),
            en_yes: count(doc, "yesCountEn"),
            en_no: count(doc, "noCountEn"),
            fr_yes: count(doc, "yesCountFr"),
            fr_no: count(doc, "noCountFr"),
        })
        .unwrap_or_default();

    Ok(PublicFeedbackMetrics {
        public_feedback_totals: totals,
        public_feedback_reasons: PublicFeedbackReasons {
            yes: reason_counts(&yes),
            no: reason_counts(&no),
        },
    })
}
