//! Lazy-join pipeline builder
//!
//! Produces the shared row pipeline every metric starts from: chats in the
//! date range, unwound onto their interactions, with only the joins the
//! caller needs. Each join is a `$lookup` followed by an inclusion
//! `$project` that keeps the live row fields and extracts the joined
//! values, so joined documents never accumulate on the row. Filter
//! predicates are placed directly after the join that provides their field.
//!
//! Row fields after each join:
//!
//! | Join             | Fields                                                        |
//! |------------------|---------------------------------------------------------------|
//! | `Interaction`    | `_id`, `chatId`, `pageLanguage`, `createdAt`, `user`, `searchProvider`, `interactionId`, `referringUrl` |
//! | `Context`        | `department`, `contextInputTokens`, `contextOutputTokens`    |
//! | `Answer`         | `answerType`, `answerInputTokens`, `answerOutputTokens`      |
//! | `Citation`       | `citationUrl`                                                 |
//! | `Tools`          | `toolCount`                                                   |
//! | `ExpertFeedback` | `expertFeedbackId`, `partnerEval`                             |
//! | `AutoEval`       | `aiFeedbackId`, `aiEval`                                      |
//! | `PublicFeedback` | `publicFeedback`, `publicFeedbackReason`                      |
//!
//! `Citation` and `Tools` hang off the answer, so requiring either also
//! requires `Answer`. On a chat kept without interactions every joined
//! field is null or missing.

use std::collections::BTreeSet;

use bson::{doc, oid::ObjectId, Bson, Document};

use crate::categorizer::category_expression;
use crate::db::schemas::{
    ANSWER_COLLECTION, CITATION_COLLECTION, CONTEXT_COLLECTION, EVAL_COLLECTION,
    EXPERT_FEEDBACK_COLLECTION, INTERACTION_COLLECTION, PUBLIC_FEEDBACK_COLLECTION,
    TOOL_COLLECTION,
};
use crate::filters::{compile, CompileOptions, DateRange, FilterSpec, Fragment};

/// A source of row fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Join {
    /// The unwound interaction; always present
    Interaction,
    Context,
    Answer,
    /// The answer's citation
    Citation,
    /// Tool calls made for the answer
    Tools,
    ExpertFeedback,
    /// Automated eval and the expert feedback it points at
    AutoEval,
    PublicFeedback,
}

impl Join {
    /// Joins that need a lookup, in emission order
    pub const LOOKUPS: [Join; 7] = [
        Join::Context,
        Join::Answer,
        Join::Citation,
        Join::Tools,
        Join::ExpertFeedback,
        Join::AutoEval,
        Join::PublicFeedback,
    ];

    /// Join whose document holds the reference
    pub fn parent(&self) -> Join {
        match self {
            Join::Citation | Join::Tools => Join::Answer,
            _ => Join::Interaction,
        }
    }

    /// Row field carrying the reference for this join
    fn ref_field(&self) -> &'static str {
        match self {
            Join::Interaction => "interactionId",
            Join::Context => "contextRef",
            Join::Answer => "answerRef",
            Join::Citation => "citationRef",
            Join::Tools => "toolRefs",
            Join::ExpertFeedback => "expertFeedbackRef",
            Join::AutoEval => "autoEvalRef",
            Join::PublicFeedback => "publicFeedbackRef",
        }
    }

    /// Field of the parent document holding the reference
    fn source_field(&self) -> &'static str {
        match self {
            Join::Interaction => "_id",
            Join::Context => "context",
            Join::Answer => "answer",
            Join::Citation => "citation",
            Join::Tools => "tools",
            Join::ExpertFeedback => "expertFeedback",
            Join::AutoEval => "autoEval",
            Join::PublicFeedback => "publicFeedback",
        }
    }
}

const CHAT_FIELDS: [&str; 5] = [
    "chatId",
    "pageLanguage",
    "createdAt",
    "user",
    "searchProvider",
];

fn first(path: &str) -> Bson {
    Bson::Document(doc! { "$arrayElemAt": [path, 0] })
}

/// Token counts may be stored as numbers or numeric strings
fn token_count(path: &str) -> Bson {
    Bson::Document(doc! {
        "$convert": { "input": first(path), "to": "long", "onError": 0_i64, "onNull": 0_i64 }
    })
}

fn lookup(from: &str, local_field: &str, as_field: &str) -> Document {
    doc! {
        "$lookup": {
            "from": from,
            "localField": local_field,
            "foreignField": "_id",
            "as": as_field,
        }
    }
}

/// Live row fields plus the stages that extend them
struct RowStages {
    live: Vec<&'static str>,
    stages: Vec<Document>,
}

impl RowStages {
    /// Inclusion projection keeping live fields and adding `extracted`
    fn project(&mut self, extracted: Vec<(&'static str, Bson)>) {
        let mut spec = Document::new();
        for field in &self.live {
            spec.insert(*field, 1);
        }
        for (field, value) in extracted {
            spec.insert(field, value);
            self.live.push(field);
        }
        self.stages.push(doc! { "$project": spec });
    }

    fn retire(&mut self, field: &str) {
        self.live.retain(|f| *f != field);
    }
}

/// Builder for the per-interaction row pipeline
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    range: DateRange,
    last_id: Option<ObjectId>,
    keep_empty_chats: bool,
    joins: BTreeSet<Join>,
    fragments: Vec<Fragment>,
}

impl PipelineBuilder {
    /// Rows for chats created within `range`
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            last_id: None,
            keep_empty_chats: false,
            joins: BTreeSet::new(),
            fragments: Vec::new(),
        }
    }

    /// Only chats with an id below `last_id`
    pub fn with_cursor(mut self, last_id: Option<ObjectId>) -> Self {
        self.last_id = last_id;
        self
    }

    /// Keep chats without interactions as a single row
    pub fn keep_empty_chats(mut self) -> Self {
        self.keep_empty_chats = true;
        self
    }

    /// Require a join regardless of filters
    pub fn require(mut self, join: Join) -> Self {
        if join != Join::Interaction {
            self.joins.insert(join);
            self = self.require(join.parent());
        }
        self
    }

    /// Add one predicate; its join becomes required
    pub fn with_fragment(mut self, fragment: Fragment) -> Self {
        self = self.require(fragment.requires);
        self.fragments.push(fragment);
        self
    }

    /// Compile and add every active filter
    pub fn with_filters(self, filters: &FilterSpec) -> Self {
        compile(filters, &CompileOptions::default())
            .into_iter()
            .fold(self, |builder, fragment| builder.with_fragment(fragment))
    }

    pub fn requires(&self, join: Join) -> bool {
        join == Join::Interaction || self.joins.contains(&join)
    }

    /// The chat-level `$match` condition
    pub fn chat_match(&self) -> Document {
        let mut condition = doc! { "createdAt": self.range.to_condition() };
        if let Some(last_id) = self.last_id {
            condition.insert("_id", doc! { "$lt": last_id });
        }
        condition
    }

    fn push_filters(&self, stages: &mut Vec<Document>, join: Join) {
        let mut predicates: Vec<Document> = self
            .fragments
            .iter()
            .filter(|f| f.requires == join)
            .map(|f| f.predicate.clone())
            .collect();
        match predicates.len() {
            0 => {}
            1 => stages.push(doc! { "$match": predicates.remove(0) }),
            _ => stages.push(doc! { "$match": { "$and": predicates } }),
        }
    }

    /// Emit the pipeline
    pub fn build(&self) -> Vec<Document> {
        let mut interactions_spec = Document::new();
        for field in CHAT_FIELDS {
            interactions_spec.insert(field, 1);
        }
        interactions_spec.insert("interactions", 1);

        let unwind = if self.keep_empty_chats {
            doc! { "$unwind": { "path": "$interactions", "preserveNullAndEmptyArrays": true } }
        } else {
            doc! { "$unwind": "$interactions" }
        };

        let mut row = RowStages {
            live: CHAT_FIELDS.to_vec(),
            stages: vec![
                doc! { "$match": self.chat_match() },
                doc! { "$project": interactions_spec },
                lookup(INTERACTION_COLLECTION, "interactions", "interactions"),
                unwind,
            ],
        };

        let mut extracted: Vec<(&'static str, Bson)> = vec![
            ("interactionId", Bson::String("$interactions._id".into())),
            (
                "referringUrl",
                Bson::String("$interactions.referringUrl".into()),
            ),
        ];
        for join in Join::LOOKUPS
            .into_iter()
            .filter(|j| j.parent() == Join::Interaction && self.requires(*j))
        {
            extracted.push((
                join.ref_field(),
                Bson::String(format!("$interactions.{}", join.source_field())),
            ));
        }
        row.project(extracted);
        self.push_filters(&mut row.stages, Join::Interaction);

        for join in Join::LOOKUPS.into_iter().filter(|j| self.requires(*j)) {
            self.push_join(&mut row, join);
            self.push_filters(&mut row.stages, join);
        }

        row.stages
    }

    fn push_join(&self, row: &mut RowStages, join: Join) {
        let reference = join.ref_field();
        row.retire(reference);

        match join {
            Join::Interaction => {}
            Join::Context => {
                row.stages.push(lookup(CONTEXT_COLLECTION, reference, "ctx"));
                row.project(vec![
                    ("department", first("$ctx.department")),
                    ("contextInputTokens", token_count("$ctx.inputTokens")),
                    ("contextOutputTokens", token_count("$ctx.outputTokens")),
                ]);
            }
            Join::Answer => {
                row.stages.push(lookup(ANSWER_COLLECTION, reference, "ans"));
                // An interaction without a stored type counts as normal; a
                // chat without interactions has no answer type at all
                let answer_type = doc! {
                    "$cond": [
                        { "$ifNull": ["$interactionId", false] },
                        { "$ifNull": [first("$ans.answerType"), "normal"] },
                        null,
                    ]
                };
                let mut extracted = vec![
                    ("answerType", Bson::Document(answer_type)),
                    ("answerInputTokens", token_count("$ans.inputTokens")),
                    ("answerOutputTokens", token_count("$ans.outputTokens")),
                ];
                if self.requires(Join::Citation) {
                    extracted.push((
                        Join::Citation.ref_field(),
                        first(&format!("$ans.{}", Join::Citation.source_field())),
                    ));
                }
                if self.requires(Join::Tools) {
                    let tools = first(&format!("$ans.{}", Join::Tools.source_field()));
                    extracted.push((
                        Join::Tools.ref_field(),
                        Bson::Document(doc! { "$ifNull": [tools, []] }),
                    ));
                }
                row.project(extracted);
            }
            Join::Citation => {
                row.stages.push(lookup(CITATION_COLLECTION, reference, "cit"));
                row.project(vec![(
                    "citationUrl",
                    Bson::Document(doc! {
                        "$ifNull": [
                            first("$cit.providedCitationUrl"),
                            first("$cit.aiCitationUrl"),
                        ]
                    }),
                )]);
            }
            Join::Tools => {
                row.stages.push(lookup(TOOL_COLLECTION, reference, "toolDocs"));
                row.project(vec![("toolCount", Bson::Document(doc! { "$size": "$toolDocs" }))]);
            }
            Join::ExpertFeedback => {
                row.stages
                    .push(lookup(EXPERT_FEEDBACK_COLLECTION, reference, "ef"));
                row.project(vec![
                    ("expertFeedbackId", first("$ef._id")),
                    ("partnerEval", category_expression(first("$ef"))),
                ]);
            }
            Join::AutoEval => {
                row.stages.push(lookup(EVAL_COLLECTION, reference, "evalDoc"));
                row.project(vec![(
                    "aiFeedbackRef",
                    first("$evalDoc.expertFeedback"),
                )]);
                row.retire("aiFeedbackRef");
                row.stages
                    .push(lookup(EXPERT_FEEDBACK_COLLECTION, "aiFeedbackRef", "aief"));
                row.project(vec![
                    ("aiFeedbackId", first("$aief._id")),
                    ("aiEval", category_expression(first("$aief"))),
                ]);
            }
            Join::PublicFeedback => {
                row.stages
                    .push(lookup(PUBLIC_FEEDBACK_COLLECTION, reference, "pf"));
                row.project(vec![
                    ("publicFeedback", first("$pf.feedback")),
                    ("publicFeedbackReason", first("$pf.publicFeedbackReason")),
                ]);
            }
        }
    }
}
