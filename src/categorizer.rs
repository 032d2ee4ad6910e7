//! Feedback categorizer
//!
//! Classifies an expert feedback record into a single verdict. The same
//! rules exist twice: [`categorize`] evaluates a record in memory and
//! [`category_expression`] emits an aggregation expression so pipelines can
//! filter and group on the verdict without materializing records. Both
//! forms must agree on every input.
//!
//! Priority, highest first:
//! 1. `harmful`: any sentence flagged harmful
//! 2. `hasCitationError`: citation score 0
//! 3. `hasError`: any sentence score 0, or total score 0
//! 4. `needsImprovement`: any sentence score 80, citation score 20, or total score 80
//! 5. `correct`: total score 100, citation score 25, or any sentence score 100
//!
//! A record with no recognized value in any field has no verdict.

use bson::{bson, Bson};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::schemas::ExpertFeedbackDoc;

const SENTENCE_SCORES: [i32; 3] = [0, 80, 100];
const CITATION_SCORES: [i32; 3] = [0, 20, 25];
const TOTAL_SCORES: [i32; 3] = [0, 80, 100];

const SENTENCE_SCORE_FIELDS: [&str; 4] = [
    "sentence1Score",
    "sentence2Score",
    "sentence3Score",
    "sentence4Score",
];
const SENTENCE_HARMFUL_FIELDS: [&str; 4] = [
    "sentence1Harmful",
    "sentence2Harmful",
    "sentence3Harmful",
    "sentence4Harmful",
];

/// Verdict for one expert feedback record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Harmful,
    HasCitationError,
    HasError,
    NeedsImprovement,
    Correct,
}

impl Category {
    /// Every category, highest priority first
    pub const ALL: [Category; 5] = [
        Category::Harmful,
        Category::HasCitationError,
        Category::HasError,
        Category::NeedsImprovement,
        Category::Correct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Harmful => "harmful",
            Category::HasCitationError => "hasCitationError",
            Category::HasError => "hasError",
            Category::NeedsImprovement => "needsImprovement",
            Category::Correct => "correct",
        }
    }

    /// Parse a wire token
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == token)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorize a record in memory
pub fn categorize(feedback: Option<&ExpertFeedbackDoc>) -> Option<Category> {
    let ef = feedback?;
    let scores = ef.sentence_scores();
    let any_sentence = |value: i32| scores.iter().any(|s| *s == Some(value));
    let harmful = ef.sentence_harmful().iter().any(|h| *h == Some(true));

    let has_signal = harmful
        || scores
            .iter()
            .flatten()
            .any(|s| SENTENCE_SCORES.contains(s))
        || ef.citation_score.is_some_and(|c| CITATION_SCORES.contains(&c))
        || ef.total_score.is_some_and(|t| TOTAL_SCORES.contains(&t));
    if !has_signal {
        return None;
    }

    if harmful {
        Some(Category::Harmful)
    } else if ef.citation_score == Some(0) {
        Some(Category::HasCitationError)
    } else if any_sentence(0) || ef.total_score == Some(0) {
        Some(Category::HasError)
    } else if any_sentence(80) || ef.citation_score == Some(20) || ef.total_score == Some(80) {
        Some(Category::NeedsImprovement)
    } else if ef.total_score == Some(100) || ef.citation_score == Some(25) || any_sentence(100) {
        Some(Category::Correct)
    } else {
        None
    }
}

fn var(field: &str) -> String {
    format!("$$ef.{}", field)
}

fn any_equals(fields: &[&str], value: Bson) -> Bson {
    let clauses: Vec<Bson> = fields
        .iter()
        .map(|f| bson!({ "$eq": [var(f), value.clone()] }))
        .collect();
    bson!({ "$or": clauses })
}

fn in_set(field: &str, values: &[i32]) -> Bson {
    bson!({ "$in": [var(field), values.to_vec()] })
}

/// Aggregation expression computing the verdict of the record at `feedback`
///
/// `feedback` is any expression resolving to an expert feedback document,
/// e.g. `"$expertFeedback"` or `{ "$arrayElemAt": ["$ef", 0] }`. Evaluates
/// to the category string, or null when there is no verdict.
pub fn category_expression(feedback: impl Into<Bson>) -> Bson {
    let feedback: Bson = feedback.into();
    let mut signals: Vec<Bson> = SENTENCE_SCORE_FIELDS
        .iter()
        .map(|f| in_set(f, &SENTENCE_SCORES))
        .collect();
    signals.push(in_set("citationScore", &CITATION_SCORES));
    signals.push(in_set("totalScore", &TOTAL_SCORES));
    signals.push(any_equals(&SENTENCE_HARMFUL_FIELDS, Bson::Boolean(true)));

    let mut error_fields = SENTENCE_SCORE_FIELDS.to_vec();
    error_fields.push("totalScore");

    let needs_improvement = bson!({ "$or": [
        any_equals(&SENTENCE_SCORE_FIELDS, Bson::Int32(80)),
        { "$eq": [var("citationScore"), 20] },
        { "$eq": [var("totalScore"), 80] },
    ] });
    let correct = bson!({ "$or": [
        { "$eq": [var("totalScore"), 100] },
        { "$eq": [var("citationScore"), 25] },
        any_equals(&SENTENCE_SCORE_FIELDS, Bson::Int32(100)),
    ] });

    bson!({
        "$let": {
            "vars": { "ef": { "$ifNull": [feedback, null] } },
            "in": {
                "$switch": {
                    "branches": [
                        { "case": { "$not": [{ "$or": signals }] }, "then": null },
                        {
                            "case": any_equals(&SENTENCE_HARMFUL_FIELDS, Bson::Boolean(true)),
                            "then": Category::Harmful.as_str(),
                        },
                        {
                            "case": { "$eq": [var("citationScore"), 0] },
                            "then": Category::HasCitationError.as_str(),
                        },
                        {
                            "case": any_equals(&error_fields, Bson::Int32(0)),
                            "then": Category::HasError.as_str(),
                        },
                        { "case": needs_improvement, "then": Category::NeedsImprovement.as_str() },
                        { "case": correct, "then": Category::Correct.as_str() },
                    ],
                    "default": null,
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{eval, Scope};
    use bson::doc;

    fn record() -> ExpertFeedbackDoc {
        ExpertFeedbackDoc::default()
    }

    fn evaluate(feedback: &ExpertFeedbackDoc) -> Option<String> {
        let root = doc! { "ef": bson::to_bson(feedback).unwrap() };
        match eval(&category_expression("$ef"), &Scope::new(&root)).unwrap() {
            Bson::String(s) => Some(s),
            Bson::Null => None,
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_harmful_beats_citation_error() {
        let ef = ExpertFeedbackDoc {
            sentence1_harmful: Some(true),
            citation_score: Some(0),
            ..record()
        };
        assert_eq!(categorize(Some(&ef)), Some(Category::Harmful));
    }

    #[test]
    fn test_empty_record_has_no_verdict() {
        assert_eq!(categorize(Some(&record())), None);
        assert_eq!(categorize(None), None);

        let unrecognized = ExpertFeedbackDoc {
            sentence1_score: Some(50),
            citation_score: Some(10),
            sentence2_harmful: Some(false),
            ..record()
        };
        assert_eq!(categorize(Some(&unrecognized)), None);
    }

    #[test]
    fn test_priority_order() {
        let ef = ExpertFeedbackDoc {
            sentence1_score: Some(100),
            sentence2_score: Some(80),
            ..record()
        };
        assert_eq!(categorize(Some(&ef)), Some(Category::NeedsImprovement));

        let ef = ExpertFeedbackDoc {
            sentence1_score: Some(80),
            total_score: Some(0),
            ..record()
        };
        assert_eq!(categorize(Some(&ef)), Some(Category::HasError));

        let ef = ExpertFeedbackDoc {
            sentence1_score: Some(0),
            citation_score: Some(0),
            ..record()
        };
        assert_eq!(categorize(Some(&ef)), Some(Category::HasCitationError));
    }

    #[test]
    fn test_correct_signals() {
        let total = ExpertFeedbackDoc {
            total_score: Some(100),
            ..record()
        };
        assert_eq!(categorize(Some(&total)), Some(Category::Correct));

        let citation = ExpertFeedbackDoc {
            citation_score: Some(25),
            ..record()
        };
        assert_eq!(categorize(Some(&citation)), Some(Category::Correct));

        let citation_partial = ExpertFeedbackDoc {
            citation_score: Some(20),
            ..record()
        };
        assert_eq!(
            categorize(Some(&citation_partial)),
            Some(Category::NeedsImprovement)
        );
    }

    #[test]
    fn test_category_tokens() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category));
        }
        assert_eq!(Category::parse("noEval"), None);
    }

    #[test]
    fn test_expression_handles_missing_feedback() {
        let root = doc! {};
        let verdict = eval(&category_expression("$missing"), &Scope::new(&root)).unwrap();
        assert_eq!(verdict, Bson::Null);

        let root = doc! { "ef": [] };
        let verdict = eval(
            &category_expression(bson!({ "$arrayElemAt": ["$ef", 0] })),
            &Scope::new(&root),
        )
        .unwrap();
        assert_eq!(verdict, Bson::Null);
    }

    #[test]
    fn test_expression_matches_direct_evaluator() {
        let scores = [None, Some(0), Some(80), Some(100)];
        let citations = [None, Some(0), Some(20), Some(25), Some(80)];
        let harmful_patterns: [[Option<bool>; 4]; 4] = [
            [None, None, None, None],
            [Some(true), None, None, None],
            [Some(false), Some(false), None, None],
            [Some(false), None, None, Some(true)],
        ];

        let mut checked = 0;
        for s1 in scores {
            for s2 in scores {
                for s3 in scores {
                    for s4 in scores {
                        for citation in citations {
                            for total in scores {
                                for harmful in harmful_patterns {
                                    let ef = ExpertFeedbackDoc {
                                        id: None,
                                        sentence1_score: s1,
                                        sentence2_score: s2,
                                        sentence3_score: s3,
                                        sentence4_score: s4,
                                        sentence1_harmful: harmful[0],
                                        sentence2_harmful: harmful[1],
                                        sentence3_harmful: harmful[2],
                                        sentence4_harmful: harmful[3],
                                        citation_score: citation,
                                        total_score: total,
                                    };
                                    let direct = categorize(Some(&ef)).map(|c| c.to_string());
                                    assert_eq!(direct, evaluate(&ef), "disagreement on {:?}", ef);
                                    checked += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(checked, 4 * 4 * 4 * 4 * 5 * 4 * 4);
    }
}
