//! Chat listing
//!
//! One row per chat with its matching interactions summarized. Chats
//! without interactions are kept. The page and the total count run as two
//! concurrent aggregations over the same stages.

use bson::{bson, doc, oid::ObjectId, Bson, Document};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::common::{count, present};
use crate::categorizer::Category;
use crate::db::schemas::{AnswerType, CHAT_COLLECTION};
use crate::filters::{ListingParams, MetricsRequest, Pagination};
use crate::pipeline::{Executor, Join, PipelineBuilder};
use crate::types::Result;

/// Answer types, most significant first
const ANSWER_TYPE_PRIORITY: [AnswerType; 4] = [
    AnswerType::NotGc,
    AnswerType::PtMuni,
    AnswerType::ClarifyingQuestion,
    AnswerType::Normal,
];

/// One listing row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRow {
    pub id: String,
    pub chat_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub page_language: String,
    pub department: String,
    pub all_departments: Vec<String>,
    pub referring_url: String,
    pub answer_type: Option<String>,
    pub partner_eval: Option<String>,
    pub ai_eval: Option<String>,
    pub user_type: String,
    pub interaction_count: i64,
}

impl ChatRow {
    fn from_doc(doc: &Document) -> Self {
        let text = |field: &str| doc.get_str(field).map(str::to_string).ok();
        Self {
            id: doc
                .get_object_id("_id")
                .map(|id| id.to_hex())
                .unwrap_or_default(),
            chat_id: text("chatId").unwrap_or_default(),
            created_at: doc.get_datetime("createdAt").ok().map(|dt| dt.to_chrono()),
            page_language: text("pageLanguage").unwrap_or_default(),
            department: text("department").unwrap_or_default(),
            all_departments: doc
                .get_array("allDepartments")
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|d| d.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            referring_url: text("referringUrl").unwrap_or_default(),
            answer_type: text("answerType"),
            partner_eval: text("partnerEval"),
            ai_eval: text("aiEval"),
            user_type: text("userType").unwrap_or_default(),
            interaction_count: count(doc, "interactionCount"),
        }
    }
}

/// Paging metadata returned with the rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub total_count: i64,
    /// Cursor for the next page, set when this page is full
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_last_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draw: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatListing {
    pub rows: Vec<ChatRow>,
    pub pagination: ListingPage,
}

/// Highest-priority member of `array` among `priorities`, else null
fn highest(array: &str, priorities: &[&str]) -> Bson {
    let branches: Vec<Bson> = priorities
        .iter()
        .map(|p| bson!({ "case": { "$in": [*p, array] }, "then": *p }))
        .collect();
    bson!({ "$switch": { "branches": branches, "default": null } })
}

fn non_empty(array: &str) -> Bson {
    bson!({
        "$filter": {
            "input": array,
            "as": "item",
            "cond": { "$and": [
                { "$ne": ["$$item", null] },
                { "$ne": ["$$item", ""] },
            ] },
        }
    })
}

/// The filtered department when the chat has it, else the department of
/// its earliest interaction that has one
fn department_expression(filtered: Option<&str>) -> Bson {
    let first = bson!({ "$ifNull": [{ "$arrayElemAt": ["$$departments", 0] }, ""] });
    let chosen = match filtered {
        Some(department) => bson!({
            "$cond": [
                { "$gte": [{ "$indexOfArray": ["$$departments", department] }, 0] },
                department,
                first,
            ]
        }),
        None => first,
    };
    bson!({
        "$let": {
            "vars": { "departments": non_empty("$departmentsInOrder") },
            "in": chosen,
        }
    })
}

/// Stages shared by the page and the count
pub fn base_pipeline(request: &MetricsRequest, listing: &ListingParams) -> Vec<Document> {
    let last_id = match listing.pagination {
        Pagination::Cursor { last_id, .. } => last_id,
        Pagination::Table { .. } => None,
    };

    let mut stages = PipelineBuilder::new(request.range)
        .with_cursor(last_id)
        .keep_empty_chats()
        .require(Join::Context)
        .require(Join::Answer)
        .require(Join::ExpertFeedback)
        .require(Join::AutoEval)
        .with_filters(&request.filters)
        .build();

    // `$push` keeps this order within each chat; `$addToSet` order is unspecified
    stages.push(doc! { "$sort": { "_id": 1, "interactionId": 1 } });
    stages.push(doc! {
        "$group": {
            "_id": "$_id",
            "chatId": { "$first": "$chatId" },
            "createdAt": { "$first": "$createdAt" },
            "pageLanguage": { "$first": "$pageLanguage" },
            "user": { "$first": "$user" },
            "interactionCount": { "$sum": { "$cond": [present("$interactionId"), 1, 0] } },
            "departments": { "$addToSet": "$department" },
            "departmentsInOrder": { "$push": { "$ifNull": ["$department", ""] } },
            "referringUrls": { "$addToSet": "$referringUrl" },
            "answerTypes": { "$addToSet": "$answerType" },
            "partnerEvals": { "$addToSet": "$partnerEval" },
            "aiEvals": { "$addToSet": "$aiEval" },
        }
    });

    let answer_types: Vec<&str> = ANSWER_TYPE_PRIORITY.iter().map(|t| t.as_str()).collect();
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    stages.push(doc! {
        "$project": {
            "chatId": 1,
            "createdAt": 1,
            "pageLanguage": 1,
            "interactionCount": 1,
            "department": department_expression(request.filters.department.as_deref()),
            "allDepartments": non_empty("$departments"),
            "referringUrl": { "$ifNull": [{ "$arrayElemAt": [non_empty("$referringUrls"), 0] }, ""] },
            "answerType": highest("$answerTypes", &answer_types),
            "partnerEval": highest("$partnerEvals", &categories),
            "aiEval": highest("$aiEvals", &categories),
            "userType": { "$cond": [present("$user"), "admin", "public"] },
        }
    });

    if let Some(search) = &listing.search {
        stages.push(doc! {
            "$match": { "chatId": { "$regex": regex::escape(search), "$options": "i" } }
        });
    }

    stages
}

/// The page of rows
pub fn page_pipeline(request: &MetricsRequest, listing: &ListingParams) -> Vec<Document> {
    let mut stages = base_pipeline(request, listing);
    match &listing.pagination {
        Pagination::Table {
            start,
            length,
            order_by,
            descending,
            ..
        } => {
            let direction = if *descending { -1 } else { 1 };
            stages.push(doc! { "$sort": { order_by.field(): direction, "_id": direction } });
            stages.push(doc! { "$skip": *start as i64 });
            stages.push(doc! { "$limit": *length as i64 });
        }
        Pagination::Cursor { limit, .. } => {
            stages.push(doc! { "$sort": { "_id": -1 } });
            stages.push(doc! { "$limit": *limit as i64 });
        }
    }
    stages
}

/// The total count of rows ignoring paging
pub fn count_pipeline(request: &MetricsRequest, listing: &ListingParams) -> Vec<Document> {
    let mut stages = base_pipeline(request, listing);
    stages.push(doc! { "$count": "totalCount" });
    stages
}

pub async fn fetch(
    executor: &Executor,
    request: &MetricsRequest,
    listing: &ListingParams,
) -> Result<ChatListing> {
    let (page, total) = tokio::try_join!(
        executor.aggregate(CHAT_COLLECTION, page_pipeline(request, listing)),
        executor.aggregate(CHAT_COLLECTION, count_pipeline(request, listing)),
    )?;

    let next_last_id = match listing.pagination {
        Pagination::Cursor { limit, .. } if page.len() as u64 == limit => page
            .last()
            .and_then(|doc| doc.get_object_id("_id").ok())
            .map(|id: ObjectId| id.to_hex()),
        _ => None,
    };
    let draw = match listing.pagination {
        Pagination::Table { draw, .. } => Some(draw),
        Pagination::Cursor { .. } => None,
    };

    Ok(ChatListing {
        rows: page.iter().map(ChatRow::from_doc).collect(),
        pagination: ListingPage {
            total_count: total.first().map_or(0, |doc| count(doc, "totalCount")),
            next_last_id,
            draw,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{DateRange, FilterSpec, SortField};

    fn request() -> MetricsRequest {
        MetricsRequest::new(DateRange::default_window(Utc::now()), FilterSpec::default())
    }

    #[test]
    fn test_table_sort_breaks_ties_by_id() {
        let listing = ListingParams {
            search: None,
            pagination: Pagination::Table {
                start: 10,
                length: 25,
                order_by: SortField::Department,
                descending: false,
                draw: 1,
            },
        };
        let stages = page_pipeline(&request(), &listing);
        let n = stages.len();
        assert_eq!(
            stages[n - 3],
            doc! { "$sort": { "department": 1, "_id": 1 } }
        );
        assert_eq!(stages[n - 2], doc! { "$skip": 10_i64 });
        assert_eq!(stages[n - 1], doc! { "$limit": 25_i64 });
    }

    #[test]
    fn test_count_has_no_paging() {
        let stages = count_pipeline(&request(), &ListingParams::default());
        let group = stages.iter().position(|s| s.contains_key("$group")).unwrap();
        assert!(stages[group..].iter().all(|s| !s.contains_key("$sort")
            && !s.contains_key("$limit")
            && !s.contains_key("$skip")));
        assert_eq!(stages.last().unwrap(), &doc! { "$count": "totalCount" });
    }

    #[test]
    fn test_interactions_sorted_before_grouping() {
        let stages = base_pipeline(&request(), &ListingParams::default());
        let group = stages.iter().position(|s| s.contains_key("$group")).unwrap();
        assert_eq!(
            stages[group - 1],
            doc! { "$sort": { "_id": 1, "interactionId": 1 } }
        );
        let spec = stages[group].get_document("$group").unwrap();
        assert!(spec.get_document("departmentsInOrder").unwrap().contains_key("$push"));
    }

    #[test]
    fn test_search_is_escaped() {
        let listing = ListingParams {
            search: Some("a+b".into()),
            ..Default::default()
        };
        let stages = base_pipeline(&request(), &listing);
        assert_eq!(
            stages.last().unwrap(),
            &doc! { "$match": { "chatId": { "$regex": r"a\+b", "$options": "i" } } }
        );
    }

    #[test]
    fn test_row_from_sparse_doc() {
        let id = ObjectId::new();
        let row = ChatRow::from_doc(&doc! { "_id": id, "chatId": "c1", "interactionCount": 0 });
        assert_eq!(row.id, id.to_hex());
        assert_eq!(row.chat_id, "c1");
        assert_eq!(row.department, "");
        assert!(row.partner_eval.is_none());
    }
}
