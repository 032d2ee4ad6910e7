//! `$match` query evaluation for the in-memory store

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

use super::expr::{eval, Scope};
use super::value::{compare, resolve_in, truthy, type_rank, values_equal};
use crate::types::{MetricsError, Result};

/// Whether a document satisfies a query filter
pub fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clause_list(key, cond)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clause_list(key, cond)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clause_list(key, cond)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$expr" => truthy(&eval(cond, &Scope::new(doc))?),
            op if op.starts_with('$') => {
                return Err(MetricsError::store(format!(
                    "unknown top level operator: {}",
                    op
                )))
            }
            path => field_matches(&resolve_in(doc, path), cond)?,
        };

        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clause_list<'a>(op: &str, cond: &'a Bson) -> Result<Vec<&'a Document>> {
    let Bson::Array(items) = cond else {
        return Err(MetricsError::store(format!("{} must be an array", op)));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(MetricsError::store(format!(
                "{} entries must be documents",
                op
            ))),
        })
        .collect()
}

fn is_operator_doc(cond: &Bson) -> bool {
    match cond {
        Bson::Document(d) => d.keys().next().is_some_and(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(value: &Bson, cond: &Bson) -> Result<bool> {
    match cond {
        Bson::RegularExpression(re) => regex_matches(value, &re.pattern, &re.options),
        Bson::Document(ops) if is_operator_doc(cond) => {
            for (op, arg) in ops {
                if !operator_matches(value, op, arg, ops)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        literal => Ok(eq_matches(value, literal)),
    }
}

fn operator_matches(value: &Bson, op: &str, arg: &Bson, siblings: &Document) -> Result<bool> {
    Ok(match op {
        "$eq" => eq_matches(value, arg),
        "$ne" => !eq_matches(value, arg),
        "$gt" => range_matches(value, arg, |o| o == Ordering::Greater),
        "$gte" => range_matches(value, arg, |o| o != Ordering::Less),
        "$lt" => range_matches(value, arg, |o| o == Ordering::Less),
        "$lte" => range_matches(value, arg, |o| o != Ordering::Greater),
        "$in" => in_matches(value, arg)?,
        "$nin" => !in_matches(value, arg)?,
        "$exists" => {
            let present = !matches!(value, Bson::Undefined);
            present == truthy(arg)
        }
        "$regex" => {
            let options = siblings.get_str("$options").unwrap_or("");
            match arg {
                Bson::String(pattern) => regex_matches(value, pattern, options)?,
                Bson::RegularExpression(re) => regex_matches(value, &re.pattern, &re.options)?,
                _ => return Err(MetricsError::store("$regex has to be a string")),
            }
        }
        "$options" => true,
        "$not" => !field_matches(value, arg)?,
        other => {
            return Err(MetricsError::store(format!(
                "unknown operator: {}",
                other
            )))
        }
    })
}

/// Equality with array-contains semantics; a missing field equals null
fn eq_matches(value: &Bson, target: &Bson) -> bool {
    match value {
        Bson::Undefined => matches!(target, Bson::Null),
        Bson::Array(items) => {
            values_equal(value, target) || items.iter().any(|item| values_equal(item, target))
        }
        v => values_equal(v, target),
    }
}

fn range_matches(value: &Bson, target: &Bson, pred: impl Fn(Ordering) -> bool + Copy) -> bool {
    match value {
        Bson::Array(items) => items.iter().any(|item| range_matches(item, target, pred)),
        v if type_rank(v) == type_rank(target) => pred(compare(v, target)),
        _ => false,
    }
}

fn in_matches(value: &Bson, arg: &Bson) -> Result<bool> {
    let Bson::Array(candidates) = arg else {
        return Err(MetricsError::store("$in needs an array"));
    };
    for candidate in candidates {
        let hit = match candidate {
            Bson::RegularExpression(re) => regex_matches(value, &re.pattern, &re.options)?,
            c => eq_matches(value, c),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn build_regex(pattern: &str, options: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| MetricsError::store(format!("invalid regular expression: {}", e)))
}

fn regex_matches(value: &Bson, pattern: &str, options: &str) -> Result<bool> {
    let re = build_regex(pattern, options)?;
    Ok(match value {
        Bson::String(s) => re.is_match(s),
        Bson::Array(items) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if re.is_match(s))),
        _ => false,
    })
}
