//! Pipeline stage execution for the in-memory store

use bson::{Bson, Document};
use std::collections::HashMap;

use super::expr::{eval, Scope};
use super::query::matches;
use super::value::{
    as_f64, as_i64, compare, is_missing, is_nullish, key_string, remove_path, resolve_in, set_path,
    truthy,
};
use crate::types::{MetricsError, Result};

pub type Collections = HashMap<String, Vec<Document>>;

/// Run a pipeline over the documents of a starting collection
pub fn run_pipeline(
    input: Vec<Document>,
    pipeline: &[Document],
    collections: &Collections,
) -> Result<Vec<Document>> {
    let mut docs = input;
    for stage in pipeline {
        let mut keys = stage.keys();
        let (Some(name), None) = (keys.next(), keys.next()) else {
            return Err(MetricsError::store(
                "A pipeline stage specification object must contain exactly one field.",
            ));
        };
        let spec = stage.get(name).unwrap_or(&Bson::Null);
        docs = run_stage(name, spec, docs, collections)?;
    }
    Ok(docs)
}

fn run_stage(
    name: &str,
    spec: &Bson,
    docs: Vec<Document>,
    collections: &Collections,
) -> Result<Vec<Document>> {
    match name {
        "$match" => {
            let filter = stage_doc(name, spec)?;
            let mut kept = Vec::with_capacity(docs.len());
            for doc in docs {
                if matches(&doc, filter)? {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        "$project" => project(stage_doc(name, spec)?, docs),
        "$addFields" | "$set" => add_fields(stage_doc(name, spec)?, docs),
        "$lookup" => lookup(stage_doc(name, spec)?, docs, collections),
        "$unwind" => unwind(spec, docs),
        "$group" => group(stage_doc(name, spec)?, docs),
        "$sort" => sort(stage_doc(name, spec)?, docs),
        "$skip" => {
            let n = count_arg(name, spec)?;
            Ok(docs.into_iter().skip(n).collect())
        }
        "$limit" => {
            let n = count_arg(name, spec)?;
            Ok(docs.into_iter().take(n).collect())
        }
        "$count" => {
            let Bson::String(field) = spec else {
                return Err(MetricsError::store("the count field must be a string"));
            };
            if docs.is_empty() {
                return Ok(Vec::new());
            }
            let mut out = Document::new();
            out.insert(field.clone(), docs.len() as i32);
            Ok(vec![out])
        }
        other => Err(MetricsError::store(format!(
            "Unrecognized pipeline stage name: '{}'",
            other
        ))),
    }
}

fn stage_doc<'a>(name: &str, spec: &'a Bson) -> Result<&'a Document> {
    match spec {
        Bson::Document(d) => Ok(d),
        _ => Err(MetricsError::store(format!(
            "{} specification must be an object",
            name
        ))),
    }
}

fn count_arg(name: &str, spec: &Bson) -> Result<usize> {
    match as_i64(spec) {
        Some(n) if n >= 0 => Ok(n as usize),
        _ => Err(MetricsError::store(format!(
            "invalid argument to {} stage",
            name
        ))),
    }
}

/// Whether a projection value is an inclusion/exclusion flag
fn flag(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Some(truthy(value)),
        _ => None,
    }
}

fn is_expression_doc(value: &Bson) -> bool {
    match value {
        Bson::Document(d) => d.keys().next().is_some_and(|k| k.starts_with('$')),
        _ => false,
    }
}

fn project(spec: &Document, docs: Vec<Document>) -> Result<Vec<Document>> {
    let exclusion = spec
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .all(|(_, v)| flag(v) == Some(false))
        && spec.iter().any(|(k, v)| k.as_str() != "_id" || flag(v) == Some(false));

    if exclusion {
        return Ok(docs
            .into_iter()
            .map(|mut doc| {
                for (path, _) in spec {
                    remove_path(&mut doc, path);
                }
                doc
            })
            .collect());
    }

    let keep_id = spec.get("_id").and_then(flag).unwrap_or(true);
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let mut projected = Document::new();
        if keep_id && !spec.contains_key("_id") {
            if let Some(id) = doc.get("_id") {
                projected.insert("_id", id.clone());
            }
        }
        project_into(&mut projected, "", spec, &doc)?;
        out.push(projected);
    }
    Ok(out)
}

fn project_into(target: &mut Document, prefix: &str, spec: &Document, doc: &Document) -> Result<()> {
    let scope = Scope::new(doc);
    for (key, value) in spec {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match flag(value) {
            Some(true) => {
                let v = resolve_in(doc, &path);
                if !is_missing(&v) {
                    set_path(target, &path, v);
                }
            }
            Some(false) => {}
            None => match value {
                Bson::Document(nested) if !is_expression_doc(value) => {
                    project_into(target, &path, nested, doc)?;
                }
                expr => {
                    let v = eval(expr, &scope)?;
                    if !is_missing(&v) {
                        set_path(target, &path, v);
                    }
                }
            },
        }
    }
    Ok(())
}

fn add_fields(spec: &Document, docs: Vec<Document>) -> Result<Vec<Document>> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let mut computed = Vec::with_capacity(spec.len());
        {
            let scope = Scope::new(&doc);
            for (path, expr) in spec {
                computed.push((path.clone(), eval(expr, &scope)?));
            }
        }
        let mut updated = doc;
        for (path, value) in computed {
            if is_missing(&value) {
                remove_path(&mut updated, &path);
            } else {
                set_path(&mut updated, &path, value);
            }
        }
        out.push(updated);
    }
    Ok(out)
}

fn lookup(spec: &Document, docs: Vec<Document>, collections: &Collections) -> Result<Vec<Document>> {
    let get = |name: &str| {
        spec.get_str(name).map_err(|_| {
            MetricsError::store(format!("$lookup argument '{}' must be a string", name))
        })
    };
    let (from, local_field, foreign_field, as_field) =
        (get("from")?, get("localField")?, get("foreignField")?, get("as")?);

    let empty = Vec::new();
    let foreign = collections.get(from).unwrap_or(&empty);

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (pos, fdoc) in foreign.iter().enumerate() {
        match resolve_in(fdoc, foreign_field) {
            Bson::Array(values) => {
                for v in values {
                    index.entry(key_string(&v)).or_default().push(pos);
                }
            }
            v => index.entry(key_string(&v)).or_default().push(pos),
        }
    }

    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        let locals = match resolve_in(&doc, local_field) {
            Bson::Array(values) if !values.is_empty() => values,
            Bson::Array(_) => Vec::new(),
            v => vec![v],
        };
        let mut hits: Vec<usize> = locals
            .iter()
            .filter_map(|v| index.get(&key_string(v)))
            .flatten()
            .copied()
            .collect();
        hits.sort_unstable();
        hits.dedup();

        let joined: Vec<Bson> = hits
            .into_iter()
            .map(|pos| Bson::Document(foreign[pos].clone()))
            .collect();
        set_path(&mut doc, as_field, Bson::Array(joined));
        out.push(doc);
    }
    Ok(out)
}

fn unwind(spec: &Bson, docs: Vec<Document>) -> Result<Vec<Document>> {
    let (path, preserve) = match spec {
        Bson::String(p) => (p.as_str(), false),
        Bson::Document(d) => {
            let p = d
                .get_str("path")
                .map_err(|_| MetricsError::store("$unwind requires a path"))?;
            (p, d.get_bool("preserveNullAndEmptyArrays").unwrap_or(false))
        }
        _ => return Err(MetricsError::store("$unwind requires a path")),
    };
    let Some(path) = path.strip_prefix('$') else {
        return Err(MetricsError::store(
            "path option to $unwind stage should be prefixed with a '$'",
        ));
    };

    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match resolve_in(&doc, path) {
            Bson::Array(items) if items.is_empty() => {
                if preserve {
                    let mut kept = doc;
                    remove_path(&mut kept, path);
                    out.push(kept);
                }
            }
            Bson::Array(items) => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item);
                    out.push(copy);
                }
            }
            Bson::Undefined | Bson::Null => {
                if preserve {
                    out.push(doc);
                }
            }
            _ => out.push(doc),
        }
    }
    Ok(out)
}

enum Accumulator {
    Sum { int: i64, float: f64, fractional: bool },
    First(Option<Bson>),
    Last(Bson),
    Max(Option<Bson>),
    Min(Option<Bson>),
    Push(Vec<Bson>),
    AddToSet(Vec<Bson>, Vec<String>),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self> {
        Ok(match op {
            "$sum" => Self::Sum {
                int: 0,
                float: 0.0,
                fractional: false,
            },
            "$first" => Self::First(None),
            "$last" => Self::Last(Bson::Null),
            "$max" => Self::Max(None),
            "$min" => Self::Min(None),
            "$push" => Self::Push(Vec::new()),
            "$addToSet" => Self::AddToSet(Vec::new(), Vec::new()),
            other => {
                return Err(MetricsError::store(format!(
                    "unknown group operator '{}'",
                    other
                )))
            }
        })
    }

    fn feed(&mut self, value: Bson) {
        match self {
            Self::Sum {
                int,
                float,
                fractional,
            } => match value {
                Bson::Double(n) => {
                    *fractional = true;
                    *float += n;
                }
                other => {
                    if let Some(n) = as_i64(&other) {
                        *int += n;
                        *float += n as f64;
                    } else if let Some(n) = as_f64(&other) {
                        *fractional = true;
                        *float += n;
                    }
                }
            },
            Self::First(slot) => {
                if slot.is_none() {
                    *slot = Some(if is_missing(&value) { Bson::Null } else { value });
                }
            }
            Self::Last(slot) => *slot = if is_missing(&value) { Bson::Null } else { value },
            Self::Max(slot) => {
                if !is_nullish(&value)
                    && slot.as_ref().map_or(true, |cur| compare(&value, cur).is_gt())
                {
                    *slot = Some(value);
                }
            }
            Self::Min(slot) => {
                if !is_nullish(&value)
                    && slot.as_ref().map_or(true, |cur| compare(&value, cur).is_lt())
                {
                    *slot = Some(value);
                }
            }
            Self::Push(items) => {
                if !is_missing(&value) {
                    items.push(value);
                }
            }
            Self::AddToSet(items, seen) => {
                if !is_missing(&value) {
                    let key = format!("{:?}", value);
                    if !seen.contains(&key) {
                        seen.push(key);
                        items.push(value);
                    }
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Self::Sum {
                int,
                float,
                fractional,
            } => {
                if fractional {
                    Bson::Double(float)
                } else {
                    match i32::try_from(int) {
                        Ok(n) => Bson::Int32(n),
                        Err(_) => Bson::Int64(int),
                    }
                }
            }
            Self::First(slot) => slot.unwrap_or(Bson::Null),
            Self::Last(value) => value,
            Self::Max(slot) | Self::Min(slot) => slot.unwrap_or(Bson::Null),
            Self::Push(items) | Self::AddToSet(items, _) => Bson::Array(items),
        }
    }
}

fn group(spec: &Document, docs: Vec<Document>) -> Result<Vec<Document>> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| MetricsError::store("a group specification must include an _id"))?;

    let mut accumulator_specs = Vec::new();
    for (name, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let Bson::Document(acc_doc) = acc else {
            return Err(MetricsError::store(format!(
                "The field '{}' must be an accumulator object",
                name
            )));
        };
        let Some((op, arg)) = acc_doc.iter().next() else {
            return Err(MetricsError::store(format!(
                "The field '{}' must specify one accumulator",
                name
            )));
        };
        accumulator_specs.push((name.clone(), op.clone(), arg.clone()));
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (Bson, Vec<Accumulator>)> = HashMap::new();

    for doc in &docs {
        let scope = Scope::new(doc);
        let mut id = eval(id_expr, &scope)?;
        if is_missing(&id) {
            id = Bson::Null;
        }
        let key = key_string(&id);
        if !groups.contains_key(&key) {
            let mut accs = Vec::with_capacity(accumulator_specs.len());
            for (_, op, _) in &accumulator_specs {
                accs.push(Accumulator::new(op)?);
            }
            order.push(key.clone());
            groups.insert(key.clone(), (id, accs));
        }
        if let Some((_, accs)) = groups.get_mut(&key) {
            for ((_, _, arg), acc) in accumulator_specs.iter().zip(accs.iter_mut()) {
                acc.feed(eval(arg, &scope)?);
            }
        }
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        if let Some((id, accs)) = groups.remove(&key) {
            let mut row = Document::new();
            row.insert("_id", id);
            for ((name, _, _), acc) in accumulator_specs.iter().zip(accs) {
                row.insert(name.clone(), acc.finish());
            }
            out.push(row);
        }
    }
    Ok(out)
}

fn sort(spec: &Document, mut docs: Vec<Document>) -> Result<Vec<Document>> {
    let mut keys = Vec::with_capacity(spec.len());
    for (path, dir) in spec {
        let descending = match as_i64(dir) {
            Some(1) => false,
            Some(-1) => true,
            _ => return Err(MetricsError::store("$sort key ordering must be 1 or -1")),
        };
        keys.push((path.clone(), descending));
    }

    docs.sort_by(|a, b| {
        for (path, descending) in &keys {
            let left = normalize_missing(resolve_in(a, path));
            let right = normalize_missing(resolve_in(b, path));
            let ord = compare(&left, &right);
            let ord = if *descending { ord.reverse() } else { ord };
            if !ord.is_eq() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(docs)
}

fn normalize_missing(value: Bson) -> Bson {
    if is_missing(&value) {
        Bson::Null
    } else {
        value
    }
}
