//! Aggregation expression evaluation for the in-memory store
//!
//! Covers the operator subset the pipeline builder and the feedback
//! categorizer emit. Unknown operators fail the way the server does so
//! pipelines that run here also run against the strictest engine.

use bson::{Bson, Document};
use std::collections::HashMap;

use super::value::{
    as_f64, as_i64, compare, is_missing, is_nullish, resolve_in, resolve_path, truthy,
    values_equal,
};
use crate::types::{MetricsError, Result};

/// Evaluation scope: the current document plus `$let`/`$filter` variables
#[derive(Clone)]
pub struct Scope<'a> {
    root: &'a Document,
    vars: HashMap<String, Bson>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Document) -> Self {
        Self {
            root,
            vars: HashMap::new(),
        }
    }

    fn with_var(&self, name: &str, value: Bson) -> Self {
        let mut scope = self.clone();
        scope.vars.insert(name.to_string(), value);
        scope
    }

    fn variable(&self, reference: &str) -> Result<Bson> {
        let (name, rest) = match reference.split_once('.') {
            Some((name, rest)) => (name, Some(rest)),
            None => (reference, None),
        };
        let base = match name {
            "ROOT" | "CURRENT" => Bson::Document(self.root.clone()),
            other => self.vars.get(other).cloned().ok_or_else(|| {
                MetricsError::store(format!("Use of undefined variable: {}", other))
            })?,
        };
        Ok(match rest {
            Some(path) => resolve_path(&base, path),
            None => base,
        })
    }
}

/// Evaluate an expression against a scope
///
/// A missing value is returned as `Bson::Undefined`.
pub fn eval(expr: &Bson, scope: &Scope<'_>) -> Result<Bson> {
    match expr {
        Bson::String(s) if s.starts_with("$$") => scope.variable(&s[2..]),
        Bson::String(s) if s.starts_with('$') => Ok(resolve_in(scope.root, &s[1..])),
        Bson::Document(d) => {
            let mut keys = d.keys();
            match (keys.next(), keys.next()) {
                (Some(op), None) if op.starts_with('$') => {
                    let arg = d.get(op).unwrap_or(&Bson::Null);
                    eval_operator(op, arg, scope)
                }
                _ => {
                    let mut out = Document::new();
                    for (k, v) in d {
                        let value = eval(v, scope)?;
                        if !is_missing(&value) {
                            out.insert(k.clone(), value);
                        }
                    }
                    Ok(Bson::Document(out))
                }
            }
        }
        Bson::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let value = eval(item, scope)?;
                out.push(if is_missing(&value) { Bson::Null } else { value });
            }
            Ok(Bson::Array(out))
        }
        literal => Ok(literal.clone()),
    }
}

fn args<'b>(op: &str, arg: &'b Bson, count: usize) -> Result<&'b [Bson]> {
    match arg {
        Bson::Array(items) if items.len() == count => Ok(items),
        _ => Err(MetricsError::store(format!(
            "Expression {} takes exactly {} arguments",
            op, count
        ))),
    }
}

fn field<'b>(op: &str, spec: &'b Document, name: &str) -> Result<&'b Bson> {
    spec.get(name)
        .ok_or_else(|| MetricsError::store(format!("Missing '{}' parameter to {}", name, op)))
}

fn spec_doc<'b>(op: &str, arg: &'b Bson) -> Result<&'b Document> {
    match arg {
        Bson::Document(d) => Ok(d),
        _ => Err(MetricsError::store(format!("{} expects an object", op))),
    }
}

fn eval_operator(op: &str, arg: &Bson, scope: &Scope<'_>) -> Result<Bson> {
    match op {
        "$literal" => Ok(arg.clone()),

        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let pair = args(op, arg, 2)?;
            let left = eval(&pair[0], scope)?;
            let right = eval(&pair[1], scope)?;
            let ord = compare(&left, &right);
            let result = match op {
                "$eq" => ord.is_eq(),
                "$ne" => !ord.is_eq(),
                "$gt" => ord.is_gt(),
                "$gte" => ord.is_ge(),
                "$lt" => ord.is_lt(),
                _ => ord.is_le(),
            };
            Ok(Bson::Boolean(result))
        }

        "$and" | "$or" => {
            let items = match arg {
                Bson::Array(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            let want_all = op == "$and";
            for item in items {
                let t = truthy(&eval(item, scope)?);
                if want_all && !t {
                    return Ok(Bson::Boolean(false));
                }
                if !want_all && t {
                    return Ok(Bson::Boolean(true));
                }
            }
            Ok(Bson::Boolean(want_all))
        }

        "$not" => {
            let inner = match arg {
                Bson::Array(items) if items.len() == 1 => &items[0],
                other => other,
            };
            Ok(Bson::Boolean(!truthy(&eval(inner, scope)?)))
        }

        "$in" => {
            let pair = args(op, arg, 2)?;
            let needle = eval(&pair[0], scope)?;
            match eval(&pair[1], scope)? {
                Bson::Array(items) => Ok(Bson::Boolean(
                    items.iter().any(|item| values_equal(item, &needle)),
                )),
                _ => Err(MetricsError::store(
                    "$in requires an array as a second argument",
                )),
            }
        }

        "$cond" => {
            let (cond, then, otherwise) = match arg {
                Bson::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
                Bson::Document(spec) => (
                    field(op, spec, "if")?,
                    field(op, spec, "then")?,
                    field(op, spec, "else")?,
                ),
                _ => return Err(MetricsError::store("$cond takes exactly 3 arguments")),
            };
            if truthy(&eval(cond, scope)?) {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }

        "$ifNull" => {
            let Bson::Array(items) = arg else {
                return Err(MetricsError::store("$ifNull needs at least two arguments"));
            };
            let Some((fallback, candidates)) = items.split_last() else {
                return Err(MetricsError::store("$ifNull needs at least two arguments"));
            };
            for candidate in candidates {
                let value = eval(candidate, scope)?;
                if !is_nullish(&value) {
                    return Ok(value);
                }
            }
            eval(fallback, scope)
        }

        "$switch" => {
            let spec = spec_doc(op, arg)?;
            let Some(Bson::Array(branches)) = spec.get("branches") else {
                return Err(MetricsError::store("$switch requires at least one branch"));
            };
            for branch in branches {
                let branch = spec_doc(op, branch)?;
                if truthy(&eval(field(op, branch, "case")?, scope)?) {
                    return eval(field(op, branch, "then")?, scope);
                }
            }
            match spec.get("default") {
                Some(default) => eval(default, scope),
                None => Err(MetricsError::store(
                    "$switch could not find a matching branch for an input, and no default was specified.",
                )),
            }
        }

        "$let" => {
            let spec = spec_doc(op, arg)?;
            let vars = spec_doc(op, field(op, spec, "vars")?)?;
            let mut inner = scope.clone();
            for (name, value_expr) in vars {
                let value = eval(value_expr, scope)?;
                inner = inner.with_var(name, value);
            }
            eval(field(op, spec, "in")?, &inner)
        }

        "$arrayElemAt" => {
            let pair = args(op, arg, 2)?;
            let array = eval(&pair[0], scope)?;
            let index = eval(&pair[1], scope)?;
            if is_nullish(&array) || is_nullish(&index) {
                return Ok(Bson::Null);
            }
            let (Bson::Array(items), Some(idx)) = (array, as_i64(&index)) else {
                return Err(MetricsError::store(
                    "$arrayElemAt's first argument must be an array and second an integer",
                ));
            };
            let len = items.len() as i64;
            let pos = if idx < 0 { len + idx } else { idx };
            if pos < 0 || pos >= len {
                return Ok(Bson::Undefined);
            }
            Ok(items[pos as usize].clone())
        }

        "$size" => {
            let inner = match arg {
                Bson::Array(items) if items.len() == 1 => &items[0],
                other => other,
            };
            match eval(inner, scope)? {
                Bson::Array(items) => Ok(Bson::Int32(items.len() as i32)),
                _ => Err(MetricsError::store(
                    "The argument to $size must be an array",
                )),
            }
        }

        "$add" => {
            let Bson::Array(items) = arg else {
                return Err(MetricsError::store("$add expects an array"));
            };
            let mut int_sum: i64 = 0;
            let mut float_sum: f64 = 0.0;
            let mut fractional = false;
            let mut date: Option<i64> = None;
            for item in items {
                match eval(item, scope)? {
                    v if is_nullish(&v) => return Ok(Bson::Null),
                    Bson::DateTime(dt) => date = Some(dt.timestamp_millis()),
                    Bson::Double(n) => {
                        fractional = true;
                        float_sum += n;
                    }
                    v => match as_i64(&v) {
                        Some(n) => {
                            int_sum += n;
                            float_sum += n as f64;
                        }
                        None => {
                            return Err(MetricsError::store(
                                "$add only supports numeric or date types",
                            ))
                        }
                    },
                }
            }
            Ok(match (date, fractional) {
                (Some(ms), _) => Bson::DateTime(bson::DateTime::from_millis(ms + float_sum as i64)),
                (None, true) => Bson::Double(float_sum),
                (None, false) => int_result(int_sum),
            })
        }

        "$convert" => {
            let spec = spec_doc(op, arg)?;
            let input = eval(field(op, spec, "input")?, scope)?;
            let target = match field(op, spec, "to")? {
                Bson::String(t) => t.as_str(),
                _ => return Err(MetricsError::store("$convert 'to' must be a type name")),
            };
            if is_nullish(&input) {
                return match spec.get("onNull") {
                    Some(on_null) => eval(on_null, scope),
                    None => Ok(Bson::Null),
                };
            }
            match convert(&input, target) {
                Some(value) => Ok(value),
                None => match spec.get("onError") {
                    Some(on_error) => eval(on_error, scope),
                    None => Err(MetricsError::store(format!(
                        "Failed to parse {:?} as {}",
                        input, target
                    ))),
                },
            }
        }

        "$filter" => {
            let spec = spec_doc(op, arg)?;
            let name = var_name(spec);
            let input = eval(field(op, spec, "input")?, scope)?;
            let cond = field(op, spec, "cond")?;
            match input {
                v if is_nullish(&v) => Ok(Bson::Null),
                Bson::Array(items) => {
                    let mut kept = Vec::new();
                    for item in items {
                        if truthy(&eval(cond, &scope.with_var(&name, item.clone()))?) {
                            kept.push(item);
                        }
                    }
                    Ok(Bson::Array(kept))
                }
                _ => Err(MetricsError::store("input to $filter must be an array")),
            }
        }

        "$map" => {
            let spec = spec_doc(op, arg)?;
            let name = var_name(spec);
            let input = eval(field(op, spec, "input")?, scope)?;
            let body = field(op, spec, "in")?;
            match input {
                v if is_nullish(&v) => Ok(Bson::Null),
                Bson::Array(items) => {
                    let mut mapped = Vec::with_capacity(items.len());
                    for item in items {
                        let value = eval(body, &scope.with_var(&name, item))?;
                        mapped.push(if is_missing(&value) { Bson::Null } else { value });
                    }
                    Ok(Bson::Array(mapped))
                }
                _ => Err(MetricsError::store("input to $map must be an array")),
            }
        }

        "$indexOfArray" => {
            let pair = args(op, arg, 2)?;
            let array = eval(&pair[0], scope)?;
            let needle = eval(&pair[1], scope)?;
            match array {
                v if is_nullish(&v) => Ok(Bson::Null),
                Bson::Array(items) => Ok(Bson::Int32(
                    items
                        .iter()
                        .position(|item| values_equal(item, &needle))
                        .map(|i| i as i32)
                        .unwrap_or(-1),
                )),
                _ => Err(MetricsError::store(
                    "$indexOfArray requires an array as a first argument",
                )),
            }
        }

        other => Err(MetricsError::store(format!(
            "Unrecognized expression '{}'",
            other
        ))),
    }
}

fn var_name(spec: &Document) -> String {
    spec.get_str("as").unwrap_or("this").to_string()
}

fn int_result(n: i64) -> Bson {
    match i32::try_from(n) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(n),
    }
}

fn convert(input: &Bson, target: &str) -> Option<Bson> {
    match target {
        "int" | "long" => {
            let n = match input {
                Bson::Boolean(b) => Some(*b as i64),
                Bson::Double(d) if d.is_finite() => Some(d.trunc() as i64),
                Bson::String(s) => s.trim().parse::<i64>().ok(),
                other => as_i64(other),
            }?;
            if target == "int" {
                i32::try_from(n).ok().map(Bson::Int32)
            } else {
                Some(Bson::Int64(n))
            }
        }
        "double" => match input {
            Bson::Boolean(b) => Some(Bson::Double(*b as i64 as f64)),
            Bson::String(s) => s.trim().parse::<f64>().ok().map(Bson::Double),
            other => as_f64(other).map(Bson::Double),
        },
        "string" => match input {
            Bson::String(s) => Some(Bson::String(s.clone())),
            Bson::ObjectId(oid) => Some(Bson::String(oid.to_hex())),
            Bson::Boolean(b) => Some(Bson::String(b.to_string())),
            Bson::Int32(n) => Some(Bson::String(n.to_string())),
            Bson::Int64(n) => Some(Bson::String(n.to_string())),
            Bson::Double(n) => Some(Bson::String(n.to_string())),
            _ => None,
        },
        "bool" => Some(Bson::Boolean(truthy(input))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    fn run(expr: Bson, root: &Document) -> Bson {
        eval(&expr, &Scope::new(root)).unwrap()
    }

    #[test]
    fn test_field_paths_and_missing() {
        let root = doc! { "a": { "b": 5 } };
        assert_eq!(run(bson!("$a.b"), &root), Bson::Int32(5));
        assert!(is_missing(&run(bson!("$a.z"), &root)));
    }

    #[test]
    fn test_if_null_and_cond() {
        let root = doc! { "answerType": null };
        assert_eq!(
            run(bson!({ "$ifNull": ["$answerType", "normal"] }), &root),
            Bson::String("normal".into())
        );
        let expr = bson!({ "$cond": [{ "$eq": ["$answerType", null] }, 1, 0] });
        assert_eq!(run(expr, &root), Bson::Int32(1));
    }

    #[test]
    fn test_missing_is_not_equal_to_value() {
        let root = doc! {};
        assert_eq!(run(bson!({ "$eq": ["$harmful", true] }), &root), Bson::Boolean(false));
    }

    #[test]
    fn test_let_and_switch() {
        let root = doc! { "ef": { "totalScore": 80 } };
        let expr = bson!({ "$let": {
            "vars": { "e": "$ef" },
            "in": { "$switch": {
                "branches": [
                    { "case": { "$eq": ["$$e.totalScore", 100] }, "then": "correct" },
                    { "case": { "$eq": ["$$e.totalScore", 80] }, "then": "needsImprovement" },
                ],
                "default": null,
            } },
        } });
        assert_eq!(run(expr, &root), Bson::String("needsImprovement".into()));
    }

    #[test]
    fn test_switch_without_default_errors() {
        let root = doc! {};
        let expr = bson!({ "$switch": { "branches": [ { "case": false, "then": 1 } ] } });
        assert!(eval(&expr, &Scope::new(&root)).is_err());
    }

    #[test]
    fn test_array_elem_at() {
        let root = doc! { "xs": [ { "v": 1 } ], "empty": [] };
        assert_eq!(
            run(bson!({ "$arrayElemAt": ["$xs", 0] }), &root),
            Bson::Document(doc! { "v": 1 })
        );
        assert!(is_missing(&run(bson!({ "$arrayElemAt": ["$empty", 0] }), &root)));
        assert_eq!(run(bson!({ "$arrayElemAt": ["$nope", 0] }), &root), Bson::Null);
    }

    #[test]
    fn test_convert_string_tokens() {
        let root = doc! { "a": "120", "b": "abc", "c": null, "d": 7.9 };
        let conv = |input: &str| {
            bson!({ "$convert": { "input": input, "to": "int", "onError": 0, "onNull": 0 } })
        };
        assert_eq!(run(conv("$a"), &root), Bson::Int32(120));
        assert_eq!(run(conv("$b"), &root), Bson::Int32(0));
        assert_eq!(run(conv("$c"), &root), Bson::Int32(0));
        assert_eq!(run(conv("$missing"), &root), Bson::Int32(0));
        assert_eq!(run(conv("$d"), &root), Bson::Int32(7));
    }

    #[test]
    fn test_add_and_size() {
        let root = doc! { "a": 2, "b": 3_i64, "xs": [1, 2, 3] };
        assert_eq!(run(bson!({ "$add": ["$a", "$b"] }), &root), Bson::Int32(5));
        assert_eq!(run(bson!({ "$size": "$xs" }), &root), Bson::Int32(3));
    }

    #[test]
    fn test_filter_and_map() {
        let root = doc! { "xs": [1, 5, 9] };
        let filtered = bson!({ "$filter": {
            "input": "$xs", "as": "x", "cond": { "$gt": ["$$x", 3] },
        } });
        assert_eq!(run(filtered, &root), bson!([5, 9]));
        let mapped = bson!({ "$map": {
            "input": "$xs", "as": "x", "in": { "$add": ["$$x", 1] },
        } });
        assert_eq!(run(mapped, &root), bson!([2, 6, 10]));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let root = doc! {};
        assert!(eval(&bson!({ "$function": {} }), &Scope::new(&root)).is_err());
    }
}
