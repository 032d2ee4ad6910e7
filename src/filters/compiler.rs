//! Filter condition compiler
//!
//! Maps a `FilterSpec` to independent query predicates. Each fragment names
//! the join that makes its field available so the pipeline builder can
//! place it right after that join. Pure mapping: no I/O, never fails.

use bson::{doc, Document};

use super::referral::referral_predicates;
use super::spec::{EvalChoice, FilterSpec, Selection, UserType};
use crate::pipeline::Join;

/// One predicate and the join it depends on
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub requires: Join,
    pub predicate: Document,
}

impl Fragment {
    pub fn new(requires: Join, predicate: Document) -> Self {
        Self {
            requires,
            predicate,
        }
    }
}

/// Where compiled predicates are evaluated
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Prepended to every interaction-level field path
    pub prefix: String,
    /// Path of the chat creator reference
    pub user_field: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            user_field: "user".to_string(),
        }
    }
}

impl CompileOptions {
    fn path(&self, field: &str) -> String {
        format!("{}{}", self.prefix, field)
    }
}

/// Case-insensitive substring predicate with metacharacters escaped
fn contains(field: &str, needle: &str) -> Document {
    doc! { field: { "$regex": regex::escape(needle), "$options": "i" } }
}

/// Compile a filter bag into ordered fragments
pub fn compile(spec: &FilterSpec, options: &CompileOptions) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let referring_url = options.path("referringUrl");

    if let Some(user_type) = spec.user_type {
        if !spec.skip_user_condition {
            let user = options.user_field.as_str();
            let predicate = match user_type {
                UserType::Public | UserType::ReferredPublic => doc! { user: null },
                UserType::Admin => doc! { user: { "$exists": true, "$ne": null } },
            };
            fragments.push(Fragment::new(Join::Interaction, predicate));
        }
        if user_type == UserType::ReferredPublic {
            for predicate in referral_predicates(&referring_url) {
                fragments.push(Fragment::new(Join::Interaction, predicate));
            }
        }
    }

    if let Some(department) = &spec.department {
        fragments.push(Fragment::new(
            Join::Context,
            contains(&options.path("department"), department),
        ));
    }

    if let Some(url) = &spec.referring_url {
        fragments.push(Fragment::new(
            Join::Interaction,
            contains(&referring_url, url),
        ));
    }

    let mut url_predicates: Vec<Document> = [&spec.url_en, &spec.url_fr]
        .into_iter()
        .flatten()
        .map(|url| contains(&referring_url, url))
        .collect();
    match url_predicates.len() {
        0 => {}
        1 => fragments.push(Fragment::new(Join::Interaction, url_predicates.remove(0))),
        _ => fragments.push(Fragment::new(
            Join::Interaction,
            doc! { "$or": url_predicates },
        )),
    }

    let answer_type = options.path("answerType");
    match &spec.answer_type {
        Selection::Unconstrained => {}
        Selection::Exactly(value) => fragments.push(Fragment::new(
            Join::Answer,
            doc! { answer_type.as_str(): value.as_str() },
        )),
        Selection::OneOf(values) => fragments.push(Fragment::new(
            Join::Answer,
            doc! { answer_type.as_str(): { "$in": values.clone() } },
        )),
    }

    if let Some(predicate) = eval_predicate(&options.path("partnerEval"), &spec.partner_eval) {
        fragments.push(Fragment::new(Join::ExpertFeedback, predicate));
    }
    if let Some(predicate) = eval_predicate(&options.path("aiEval"), &spec.ai_eval) {
        fragments.push(Fragment::new(Join::AutoEval, predicate));
    }

    fragments
}

/// `noEval` matches a null or empty verdict and is OR-ed with categories
pub fn eval_predicate(field: &str, selection: &Selection<EvalChoice>) -> Option<Document> {
    let choices = selection.values();
    if choices.is_empty() {
        return None;
    }

    let no_eval = choices.contains(&EvalChoice::NoEval);
    let categories: Vec<&str> = choices
        .iter()
        .filter_map(|choice| match choice {
            EvalChoice::Category(category) => Some(category.as_str()),
            EvalChoice::NoEval => None,
        })
        .collect();

    let category_match = match categories.as_slice() {
        [] => None,
        [one] => Some(doc! { field: *one }),
        many => Some(doc! { field: { "$in": many.to_vec() } }),
    };
    let no_eval_match = doc! { "$or": [ { field: null }, { field: "" } ] };

    match (no_eval, category_match) {
        (true, None) => Some(no_eval_match),
        (true, Some(category_match)) => Some(doc! { "$or": [no_eval_match, category_match] }),
        (false, category_match) => category_match,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::Category;

    fn spec() -> FilterSpec {
        FilterSpec::default()
    }

    fn compile_default(spec: &FilterSpec) -> Vec<Fragment> {
        compile(spec, &CompileOptions::default())
    }

    #[test]
    fn test_empty_spec_compiles_to_nothing() {
        assert!(compile_default(&spec()).is_empty());
    }

    #[test]
    fn test_no_eval_with_category() {
        let spec = FilterSpec {
            partner_eval: Selection::OneOf(vec![
                EvalChoice::NoEval,
                EvalChoice::Category(Category::Correct),
            ]),
            ..spec()
        };
        let fragments = compile_default(&spec);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].requires, Join::ExpertFeedback);
        assert_eq!(
            fragments[0].predicate,
            doc! { "$or": [
                { "$or": [ { "partnerEval": null }, { "partnerEval": "" } ] },
                { "partnerEval": "correct" },
            ] }
        );
    }

    #[test]
    fn test_unconstrained_eval_has_no_fragment() {
        let spec = FilterSpec {
            ai_eval: Selection::Unconstrained,
            ..spec()
        };
        assert!(compile_default(&spec).is_empty());
    }

    #[test]
    fn test_multiple_categories_use_in() {
        let pred = eval_predicate(
            "aiEval",
            &Selection::OneOf(vec![
                EvalChoice::Category(Category::Harmful),
                EvalChoice::Category(Category::HasError),
            ]),
        )
        .unwrap();
        assert_eq!(pred, doc! { "aiEval": { "$in": ["harmful", "hasError"] } });
    }

    #[test]
    fn test_department_is_escaped_and_after_context() {
        let spec = FilterSpec {
            department: Some("A.B (C)".into()),
            ..spec()
        };
        let fragments = compile_default(&spec);
        assert_eq!(fragments[0].requires, Join::Context);
        assert_eq!(
            fragments[0].predicate,
            doc! { "department": { "$regex": r"A\.B \(C\)", "$options": "i" } }
        );
    }

    #[test]
    fn test_urls_are_or_combined() {
        let spec = FilterSpec {
            url_en: Some("canada.ca/en".into()),
            url_fr: Some("canada.ca/fr".into()),
            ..spec()
        };
        let fragments = compile_default(&spec);
        assert_eq!(fragments.len(), 1);
        let clauses = fragments[0].predicate.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 2);

        let only_en = FilterSpec {
            url_en: Some("canada.ca/en".into()),
            ..self::spec()
        };
        let fragments = compile_default(&only_en);
        assert!(fragments[0].predicate.get_document("referringUrl").is_ok());
    }

    #[test]
    fn test_user_types() {
        let admin = FilterSpec {
            user_type: Some(UserType::Admin),
            ..spec()
        };
        assert_eq!(
            compile_default(&admin)[0].predicate,
            doc! { "user": { "$exists": true, "$ne": null } }
        );

        let referred = FilterSpec {
            user_type: Some(UserType::ReferredPublic),
            ..spec()
        };
        let fragments = compile_default(&referred);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].predicate, doc! { "user": null });

        let skipped = FilterSpec {
            skip_user_condition: true,
            ..referred
        };
        assert_eq!(compile_default(&skipped).len(), 2);
    }

    #[test]
    fn test_prefix_and_answer_types() {
        let spec = FilterSpec {
            answer_type: Selection::Exactly("pt-muni".into()),
            ..spec()
        };
        let options = CompileOptions {
            prefix: "interactions.".into(),
            user_field: "user".into(),
        };
        let fragments = compile(&spec, &options);
        assert_eq!(fragments[0].requires, Join::Answer);
        assert_eq!(
            fragments[0].predicate,
            doc! { "interactions.answerType": "pt-muni" }
        );
    }
}
