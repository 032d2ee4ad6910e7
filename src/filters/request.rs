//! Request parameter parsing
//!
//! `RequestParams` is the raw string bag an HTTP or CLI caller hands over.
//! Parsing turns it into a `MetricsRequest` (date range plus typed
//! filters) and, for the chat listing, `ListingParams`.

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::date_range::{self, DateRange};
use super::spec::{non_empty, parse_multi, EvalChoice, FilterSpec, UserType};
use crate::types::{MetricsError, Result};

/// Default page size in cursor mode
pub const DEFAULT_PAGE_LIMIT: u64 = 500;

/// Upper bound on any page size
pub const MAX_PAGE_LIMIT: u64 = 2000;

/// Raw request parameters, all optional strings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub timezone_offset_minutes: Option<String>,

    pub user_type: Option<String>,
    pub department: Option<String>,
    pub referring_url: Option<String>,
    pub url_en: Option<String>,
    pub url_fr: Option<String>,
    pub answer_type: Option<String>,
    pub partner_eval: Option<String>,
    pub ai_eval: Option<String>,
    pub skip_user_condition: Option<String>,

    pub limit: Option<String>,
    pub last_id: Option<String>,
    pub start: Option<String>,
    pub length: Option<String>,
    pub order_by: Option<String>,
    pub order_dir: Option<String>,
    pub draw: Option<String>,
    pub search: Option<String>,
}

/// Parsed date range and filters shared by every metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRequest {
    pub range: DateRange,
    pub filters: FilterSpec,
}

impl MetricsRequest {
    pub fn new(range: DateRange, filters: FilterSpec) -> Self {
        Self { range, filters }
    }
}

fn parse_int(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

impl RequestParams {
    /// Parse dates and filters relative to `now`
    pub fn parse(&self, now: DateTime<Utc>) -> Result<MetricsRequest> {
        let offset = parse_int(self.timezone_offset_minutes.as_deref());
        let range = date_range::resolve(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            offset,
            now,
        )
        .ok_or_else(|| {
            MetricsError::validation("startDate and endDate must be valid dates")
        })?;

        Ok(MetricsRequest::new(range, self.filter_spec()?))
    }

    /// Parse only the filter bag
    pub fn filter_spec(&self) -> Result<FilterSpec> {
        Ok(FilterSpec {
            user_type: UserType::parse(self.user_type.as_deref())?,
            department: non_empty(self.department.as_deref()),
            referring_url: non_empty(self.referring_url.as_deref()),
            url_en: non_empty(self.url_en.as_deref()),
            url_fr: non_empty(self.url_fr.as_deref()),
            answer_type: parse_multi(self.answer_type.as_deref(), |t| Ok(t.to_string()))?,
            partner_eval: parse_multi(self.partner_eval.as_deref(), EvalChoice::parse)?,
            ai_eval: parse_multi(self.ai_eval.as_deref(), EvalChoice::parse)?,
            skip_user_condition: matches!(
                self.skip_user_condition.as_deref().map(str::trim),
                Some("true") | Some("1")
            ),
        })
    }

    /// Parse the listing parameters
    ///
    /// A `length` switches to table mode; otherwise the cursor mode applies.
    pub fn listing(&self) -> Result<ListingParams> {
        let search = non_empty(self.search.as_deref());

        if let Some(length) = parse_int(self.length.as_deref()) {
            let start = parse_int(self.start.as_deref()).unwrap_or(0).max(0) as u64;
            let descending = !self
                .order_dir
                .as_deref()
                .is_some_and(|d| d.trim().eq_ignore_ascii_case("asc"));
            return Ok(ListingParams {
                search,
                pagination: Pagination::Table {
                    start,
                    length: clamp_page(length),
                    order_by: SortField::from_param(self.order_by.as_deref()),
                    descending,
                    draw: parse_int(self.draw.as_deref()).unwrap_or(0),
                },
            });
        }

        let limit = parse_int(self.limit.as_deref())
            .filter(|n| *n != 0)
            .map_or(DEFAULT_PAGE_LIMIT, clamp_page);
        let last_id = match non_empty(self.last_id.as_deref()) {
            Some(raw) => Some(
                ObjectId::parse_str(&raw)
                    .map_err(|_| MetricsError::validation("Invalid lastId"))?,
            ),
            None => None,
        };

        Ok(ListingParams {
            search,
            pagination: Pagination::Cursor { limit, last_id },
        })
    }
}

fn clamp_page(n: i64) -> u64 {
    n.clamp(1, MAX_PAGE_LIMIT as i64) as u64
}

/// Sortable listing columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    ChatId,
    Department,
    PageLanguage,
    ReferringUrl,
    UserType,
    AnswerType,
    PartnerEval,
    AiEval,
    InteractionCount,
}

impl SortField {
    const ALL: [SortField; 10] = [
        SortField::CreatedAt,
        SortField::ChatId,
        SortField::Department,
        SortField::PageLanguage,
        SortField::ReferringUrl,
        SortField::UserType,
        SortField::AnswerType,
        SortField::PartnerEval,
        SortField::AiEval,
        SortField::InteractionCount,
    ];

    /// Row field the column sorts on
    pub fn field(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::ChatId => "chatId",
            SortField::Department => "department",
            SortField::PageLanguage => "pageLanguage",
            SortField::ReferringUrl => "referringUrl",
            SortField::UserType => "userType",
            SortField::AnswerType => "answerType",
            SortField::PartnerEval => "partnerEval",
            SortField::AiEval => "aiEval",
            SortField::InteractionCount => "interactionCount",
        }
    }

    /// Unknown or missing columns sort by creation time
    pub fn from_param(raw: Option<&str>) -> Self {
        let raw = raw.map(str::trim).unwrap_or("");
        Self::ALL
            .into_iter()
            .find(|f| f.field() == raw)
            .unwrap_or(SortField::CreatedAt)
    }
}

/// How a listing page is selected
#[derive(Debug, Clone, PartialEq)]
pub enum Pagination {
    /// Offset/length paging with a sortable column
    Table {
        start: u64,
        length: u64,
        order_by: SortField,
        descending: bool,
        draw: i64,
    },
    /// Keyset paging on descending ids
    Cursor {
        limit: u64,
        last_id: Option<ObjectId>,
    },
}

/// Parsed listing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ListingParams {
    pub search: Option<String>,
    pub pagination: Pagination,
}

impl Default for ListingParams {
    fn default() -> Self {
        Self {
            search: None,
            pagination: Pagination::Cursor {
                limit: DEFAULT_PAGE_LIMIT,
                last_id: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::Category;
    use crate::filters::spec::Selection;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn test_parse_full_request() {
        let p = params(&[
            ("startDate", "2025-01-01"),
            ("endDate", "2025-01-31"),
            ("timezoneOffsetMinutes", "300"),
            ("userType", "public"),
            ("department", " CRA "),
            ("partnerEval", "noEval,correct"),
            ("answerType", "all"),
        ]);
        let req = p.parse(now()).unwrap();
        assert_eq!(req.filters.user_type, Some(UserType::Public));
        assert_eq!(req.filters.department.as_deref(), Some("CRA"));
        assert!(req.filters.answer_type.is_unconstrained());
        assert_eq!(
            req.filters.partner_eval,
            Selection::OneOf(vec![
                EvalChoice::NoEval,
                EvalChoice::Category(Category::Correct)
            ])
        );
        assert_eq!(
            req.range.gte,
            Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_bad_dates_and_offsets() {
        let p = params(&[("startDate", "2025-13-01"), ("endDate", "2025-01-02")]);
        assert_eq!(p.parse(now()).unwrap_err().status_code(), 400);

        let p = params(&[
            ("startDate", "2025-01-01"),
            ("endDate", "2025-01-02"),
            ("timezoneOffsetMinutes", "abc"),
        ]);
        let req = p.parse(now()).unwrap();
        assert_eq!(
            req.range.gte,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_tokens_rejected() {
        assert!(params(&[("aiEval", "great")]).parse(now()).is_err());
        assert!(params(&[("userType", "bot")]).parse(now()).is_err());
    }

    #[test]
    fn test_cursor_listing_defaults() {
        let listing = params(&[]).listing().unwrap();
        assert_eq!(listing, ListingParams::default());

        let listing = params(&[("limit", "5000")]).listing().unwrap();
        assert!(matches!(
            listing.pagination,
            Pagination::Cursor { limit: 2000, .. }
        ));

        assert!(params(&[("lastId", "zzz")]).listing().is_err());
        let id = ObjectId::new();
        let hex = id.to_hex();
        let listing = params(&[("lastId", hex.as_str())]).listing().unwrap();
        assert_eq!(
            listing.pagination,
            Pagination::Cursor {
                limit: DEFAULT_PAGE_LIMIT,
                last_id: Some(id)
            }
        );
    }

    #[test]
    fn test_table_listing() {
        let listing = params(&[
            ("length", "0"),
            ("start", "20"),
            ("orderBy", "department"),
            ("orderDir", "ASC"),
            ("draw", "3"),
            ("search", "abc"),
        ])
        .listing()
        .unwrap();
        assert_eq!(listing.search.as_deref(), Some("abc"));
        assert_eq!(
            listing.pagination,
            Pagination::Table {
                start: 20,
                length: 1,
                order_by: SortField::Department,
                descending: false,
                draw: 3,
            }
        );

        let listing = params(&[("length", "10"), ("orderBy", "expertEmail")])
            .listing()
            .unwrap();
        assert!(matches!(
            listing.pagination,
            Pagination::Table {
                order_by: SortField::CreatedAt,
                descending: true,
                ..
            }
        ));
    }
}
