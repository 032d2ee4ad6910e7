//! Value helpers shared by the in-memory query and expression evaluators
//!
//! Ordering follows the server's BSON comparison order so that sorting,
//! grouping and range predicates behave the same in memory and in MongoDB.
//! A missing field is represented as `Bson::Undefined` and sorts below null.

use bson::{Bson, Document};
use std::cmp::Ordering;

/// Resolve a dotted path with aggregation-expression semantics
///
/// Traversing an array maps the remaining path over its document elements.
pub fn resolve_path(value: &Bson, path: &str) -> Bson {
    let parts: Vec<&str> = path.split('.').filter(|p| !p.is_empty()).collect();
    resolve_parts(value, &parts)
}

/// Resolve a dotted path from a document root
pub fn resolve_in(doc: &Document, path: &str) -> Bson {
    let parts: Vec<&str> = path.split('.').filter(|p| !p.is_empty()).collect();
    match parts.split_first() {
        None => Bson::Document(doc.clone()),
        Some((first, rest)) => match doc.get(*first) {
            Some(v) => resolve_parts(v, rest),
            None => Bson::Undefined,
        },
    }
}

fn resolve_parts(value: &Bson, parts: &[&str]) -> Bson {
    let Some((first, rest)) = parts.split_first() else {
        return value.clone();
    };

    match value {
        Bson::Document(d) => match d.get(*first) {
            Some(v) => resolve_parts(v, rest),
            None => Bson::Undefined,
        },
        Bson::Array(items) => {
            let mapped: Vec<Bson> = items
                .iter()
                .filter(|item| matches!(item, Bson::Document(_)))
                .map(|item| resolve_parts(item, parts))
                .filter(|v| !is_missing(v))
                .collect();
            Bson::Array(mapped)
        }
        _ => Bson::Undefined,
    }
}

/// Set a dotted path, creating intermediate documents
pub fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, tail)) => {
            let needs_doc = !matches!(doc.get(head), Some(Bson::Document(_)));
            if needs_doc {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                set_path(child, tail, value);
            }
        }
    }
}

/// Remove a dotted path if present
pub fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, tail)) => {
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                remove_path(child, tail);
            }
        }
    }
}

pub fn is_missing(value: &Bson) -> bool {
    matches!(value, Bson::Undefined)
}

pub fn is_nullish(value: &Bson) -> bool {
    matches!(value, Bson::Undefined | Bson::Null)
}

/// Numeric view of a BSON value
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Integer view of a BSON value, only when it carries no fraction
pub fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

/// Truthiness in aggregation expressions
pub fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Undefined | Bson::Null => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        _ => true,
    }
}

/// Canonical type bracket used for ordering
pub fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Undefined => 1,
        Bson::Null => 2,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 3,
        Bson::String(_) | Bson::Symbol(_) => 4,
        Bson::Document(_) => 5,
        Bson::Array(_) => 6,
        Bson::Binary(_) => 7,
        Bson::ObjectId(_) => 8,
        Bson::Boolean(_) => 9,
        Bson::DateTime(_) => 10,
        Bson::Timestamp(_) => 11,
        Bson::RegularExpression(_) => 12,
        Bson::MaxKey => 255,
        _ => 13,
    }
}

/// Total order over BSON values
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Ordering::Equal
}

/// Stable string key for hashing grouped or joined values
pub fn key_string(value: &Bson) -> String {
    match value {
        Bson::Undefined | Bson::Null => "null".to_string(),
        Bson::ObjectId(oid) => format!("oid:{}", oid.to_hex()),
        Bson::String(s) => format!("str:{}", s),
        Bson::Boolean(b) => format!("bool:{}", b),
        Bson::DateTime(dt) => format!("date:{}", dt.timestamp_millis()),
        other => match as_f64(other) {
            Some(n) => format!("num:{}", n),
            None => format!("{:?}", other),
        },
    }
}
