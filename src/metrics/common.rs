//! Shared grouping helpers and output types

use bson::{bson, doc, Bson, Document};
use serde::{Deserialize, Serialize};

/// Page languages counted separately
pub const LANGUAGES: [&str; 2] = ["en", "fr"];

/// A count with its per-language split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangCount {
    pub total: i64,
    pub en: i64,
    pub fr: i64,
}

impl LangCount {
    /// Read `name`, `nameEn` and `nameFr` from a group result
    pub fn from_group(doc: &Document, name: &str) -> Self {
        Self {
            total: count(doc, name),
            en: count(doc, &format!("{}En", name)),
            fr: count(doc, &format!("{}Fr", name)),
        }
    }
}

/// Numeric field of a result document, 0 when absent or not a number
pub fn count(doc: &Document, field: &str) -> i64 {
    match doc.get(field) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}

/// Group key rendered as text
pub fn key_text(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Null | Bson::Undefined => "null".to_string(),
        other => other.to_string(),
    }
}

/// Truthy when the value at `path` is present and not null
pub fn present(path: &str) -> Bson {
    bson!({ "$ifNull": [path, false] })
}

/// `$sum` of 1 for every row where `condition` holds
pub fn count_if(condition: Bson) -> Bson {
    bson!({ "$sum": { "$cond": [condition, 1, 0] } })
}

fn in_language(lang: &str) -> Bson {
    bson!({ "$eq": ["$pageLanguage", lang] })
}

/// Insert `name`, `nameEn` and `nameFr` counters into a `$group` spec
///
/// With no condition every row counts.
pub fn insert_lang_counts(group: &mut Document, name: &str, condition: Option<Bson>) {
    match &condition {
        Some(condition) => group.insert(name, count_if(condition.clone())),
        None => group.insert(name, doc! { "$sum": 1 }),
    };
    for (lang, suffix) in LANGUAGES.iter().zip(["En", "Fr"]) {
        let in_lang = in_language(lang);
        let condition = match &condition {
            Some(condition) => bson!({ "$and": [condition.clone(), in_lang] }),
            None => in_lang,
        };
        group.insert(format!("{}{}", name, suffix), count_if(condition));
    }
}

/// Insert `name`, `nameEn` and `nameFr` sums of `value` into a `$group` spec
pub fn insert_lang_sums(group: &mut Document, name: &str, value: Bson) {
    group.insert(name, doc! { "$sum": value.clone() });
    for (lang, suffix) in LANGUAGES.iter().zip(["En", "Fr"]) {
        group.insert(
            format!("{}{}", name, suffix),
            doc! { "$sum": { "$cond": [in_language(lang), value.clone(), 0] } },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_count_reads_any_number() {
        let doc = doc! { "total": 3, "totalEn": 2_i64, "totalFr": 1.0 };
        assert_eq!(
            LangCount::from_group(&doc, "total"),
            LangCount {
                total: 3,
                en: 2,
                fr: 1
            }
        );
        assert_eq!(LangCount::from_group(&doc! {}, "total"), LangCount::default());
    }

    #[test]
    fn test_insert_lang_counts_shape() {
        let mut group = doc! { "_id": null };
        insert_lang_counts(&mut group, "yes", Some(bson!({ "$eq": ["$x", 1] })));
        assert!(group.contains_key("yes"));
        assert!(group.contains_key("yesEn"));
        assert!(group.contains_key("yesFr"));

        let mut group = doc! { "_id": null };
        insert_lang_counts(&mut group, "total", None);
        assert_eq!(group.get_document("total").unwrap(), &doc! { "$sum": 1 });
    }

    #[test]
    fn test_key_text() {
        assert_eq!(key_text(&Bson::String("CRA".into())), "CRA");
        assert_eq!(key_text(&Bson::Null), "null");
        assert_eq!(key_text(&Bson::Int32(4)), "4");
    }
}
