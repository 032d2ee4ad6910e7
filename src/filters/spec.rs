//! Typed filter specification
//!
//! Multi-select filters arrive as comma-separated strings with sentinels
//! (`all`, `noEval`). They are parsed once into sum types so nothing
//! downstream inspects sentinel strings.

use std::fmt;

use crate::categorizer::Category;
use crate::types::{MetricsError, Result};

/// Sentinel meaning "no constraint" in any multi-select filter
pub const ALL_TOKEN: &str = "all";

/// Sentinel meaning "interaction without a verdict" in eval filters
pub const NO_EVAL_TOKEN: &str = "noEval";

/// Constraint on a multi-valued field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    Unconstrained,
    Exactly(T),
    OneOf(Vec<T>),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self::Unconstrained
    }
}

impl<T: PartialEq> Selection<T> {
    /// Build from already-parsed values, collapsing duplicates
    pub fn from_values(values: Vec<T>) -> Self {
        let mut unique: Vec<T> = Vec::with_capacity(values.len());
        for value in values {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        match unique.len() {
            0 => Self::Unconstrained,
            1 => unique.pop().map_or(Self::Unconstrained, Self::Exactly),
            _ => Self::OneOf(unique),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Self::Unconstrained)
    }

    /// Selected values, empty when unconstrained
    pub fn values(&self) -> &[T] {
        match self {
            Self::Unconstrained => &[],
            Self::Exactly(value) => std::slice::from_ref(value),
            Self::OneOf(values) => values,
        }
    }
}

/// One token of an eval filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalChoice {
    NoEval,
    Category(Category),
}

impl EvalChoice {
    pub fn parse(token: &str) -> Result<Self> {
        if token == NO_EVAL_TOKEN {
            return Ok(Self::NoEval);
        }
        Category::parse(token)
            .map(Self::Category)
            .ok_or_else(|| MetricsError::validation(format!("Unknown eval category: {}", token)))
    }
}

/// Who created the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    /// No creator reference
    Public,
    /// Creator reference present
    Admin,
    /// Public, arriving from a government page
    ReferredPublic,
}

impl UserType {
    /// Parse the `userType` parameter; `all` or empty means no constraint
    pub fn parse(raw: Option<&str>) -> Result<Option<Self>> {
        match raw.map(str::trim).unwrap_or("") {
            "" | ALL_TOKEN => Ok(None),
            "public" => Ok(Some(Self::Public)),
            "admin" => Ok(Some(Self::Admin)),
            "referredPublic" => Ok(Some(Self::ReferredPublic)),
            other => Err(MetricsError::validation(format!(
                "Unknown userType: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Admin => "admin",
            Self::ReferredPublic => "referredPublic",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full filter bag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub user_type: Option<UserType>,
    pub department: Option<String>,
    pub referring_url: Option<String>,
    pub url_en: Option<String>,
    pub url_fr: Option<String>,
    pub answer_type: Selection<String>,
    pub partner_eval: Selection<EvalChoice>,
    pub ai_eval: Selection<EvalChoice>,
    pub skip_user_condition: bool,
}

impl FilterSpec {
    /// Whether anything beyond the date range constrains interactions
    pub fn has_interaction_filters(&self) -> bool {
        self.user_type.is_some()
            || self.department.is_some()
            || self.referring_url.is_some()
            || self.url_en.is_some()
            || self.url_fr.is_some()
            || !self.answer_type.is_unconstrained()
            || !self.partner_eval.is_unconstrained()
            || !self.ai_eval.is_unconstrained()
    }
}

/// Split a comma-separated multi-select; any `all` token lifts the constraint
pub fn parse_multi<T: PartialEq>(
    raw: Option<&str>,
    parse_one: impl Fn(&str) -> Result<T>,
) -> Result<Selection<T>> {
    let tokens: Vec<&str> = raw
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.iter().any(|t| *t == ALL_TOKEN) {
        return Ok(Selection::Unconstrained);
    }

    let values = tokens
        .into_iter()
        .map(parse_one)
        .collect::<Result<Vec<T>>>()?;
    Ok(Selection::from_values(values))
}

/// Non-empty trimmed text, or `None`
pub fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
