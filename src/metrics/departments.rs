//! Per-department rollup

use bson::{bson, doc, Document};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::common::{count, count_if, key_text, present};
use crate::categorizer::Category;
use crate::db::schemas::CHAT_COLLECTION;
use crate::filters::MetricsRequest;
use crate::pipeline::{Executor, Join, PipelineBuilder};
use crate::types::Result;

/// Name used when an interaction has no context department
pub const UNKNOWN_DEPARTMENT: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentScores {
    pub total: i64,
    pub correct: i64,
    pub needs_improvement: i64,
    pub has_error: i64,
    pub has_citation_error: i64,
    pub harmful: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentMetrics {
    #[serde(skip)]
    pub department: String,
    pub total: i64,
    pub expert_scored: DepartmentScores,
}

/// Departments ordered by total, serialized as a name-keyed object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByDepartment(pub Vec<DepartmentMetrics>);

impl ByDepartment {
    pub fn get(&self, department: &str) -> Option<&DepartmentMetrics> {
        self.0.iter().find(|d| d.department == department)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ByDepartment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for department in &self.0 {
            map.serialize_entry(&department.department, department)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentReport {
    pub by_department: ByDepartment,
}

fn group_key(category: Category) -> String {
    let name = category.as_str();
    let mut chars = name.chars();
    let capitalized: String = chars
        .next()
        .map(|c| c.to_ascii_uppercase())
        .into_iter()
        .chain(chars)
        .collect();
    format!("expertScored{}", capitalized)
}

pub fn pipeline(request: &MetricsRequest) -> Vec<Document> {
    let mut stages = PipelineBuilder::new(request.range)
        .with_filters(&request.filters)
        .require(Join::Context)
        .require(Join::ExpertFeedback)
        .build();

    let mut group = doc! {
        "_id": { "$ifNull": ["$department", UNKNOWN_DEPARTMENT] },
        "total": { "$sum": 1 },
        "expertScoredTotal": count_if(present("$expertFeedbackId")),
    };
    for category in Category::ALL {
        group.insert(
            group_key(category),
            count_if(bson!({ "$eq": ["$partnerEval", category.as_str()] })),
        );
    }

    stages.push(doc! { "$group": group });
    stages.push(doc! { "$sort": { "total": -1, "_id": 1 } });
    stages
}

fn from_group(doc: &Document) -> DepartmentMetrics {
    let of = |category: Category| count(doc, &group_key(category));
    DepartmentMetrics {
        department: doc.get("_id").map(key_text).unwrap_or_default(),
        total: count(doc, "total"),
        expert_scored: DepartmentScores {
            total: count(doc, "expertScoredTotal"),
            correct: of(Category::Correct),
            needs_improvement: of(Category::NeedsImprovement),
            has_error: of(Category::HasError),
            has_citation_error: of(Category::HasCitationError),
            harmful: of(Category::Harmful),
        },
    }
}

pub async fn fetch(executor: &Executor, request: &MetricsRequest) -> Result<DepartmentReport> {
    let result = executor.aggregate(CHAT_COLLECTION, pipeline(request)).await?;
    let departments = result.iter().map(from_group).collect();
    Ok(DepartmentReport {
        by_department: ByDepartment(departments),
    })
}
