//! Query options parsing and normalization
//!
//! Callers hand over loosely-typed options (`sortBy`, `populate`, `limit`,
//! `page`) straight from a query string or JSON body. They are normalized,
//! never rejected:
//! - `limit`: positive integer, otherwise the policy default (10); clamped
//!   only when the policy sets a maximum
//! - `page`: positive integer, otherwise 1
//! - `sortBy`: `field:asc|desc` pairs separated by commas; any direction
//!   other than `desc` sorts ascending
//! - `populate`: comma-separated dotted relation paths

use crate::populate::PopulateDirective;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u64 = 10;
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_ascending(self) -> bool {
        matches!(self, SortDirection::Asc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Normalized options of a paginated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub sort_by: Vec<SortKey>,
    pub populate: Vec<PopulateDirective>,
    /// Always >= 1
    pub limit: u64,
    /// Always >= 1
    pub page: u64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            sort_by: Vec::new(),
            populate: Vec::new(),
            limit: DEFAULT_LIMIT,
            page: DEFAULT_PAGE,
        }
    }
}

impl QueryOptions {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort_by.push(key);
        self
    }

    pub fn with_populate(mut self, directive: PopulateDirective) -> Self {
        self.populate.push(directive);
        self
    }

    /// Number of documents skipped before the requested page.
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Integer-ish input: a JSON number or a string such as `"20"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseInt {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl LooseInt {
    /// Integer value read the lenient way: leading whitespace and sign, then
    /// leading digits (`"12abc"` is 12, `"abc"` is nothing).
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            LooseInt::Integer(v) => Some(*v),
            LooseInt::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            LooseInt::Float(_) => None,
            LooseInt::Text(s) => parse_leading_int(s),
        }
    }
}

impl From<i64> for LooseInt {
    fn from(v: i64) -> Self {
        LooseInt::Integer(v)
    }
}

impl From<u64> for LooseInt {
    fn from(v: u64) -> Self {
        LooseInt::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<&str> for LooseInt {
    fn from(v: &str) -> Self {
        LooseInt::Text(v.to_string())
    }
}

impl From<String> for LooseInt {
    fn from(v: String) -> Self {
        LooseInt::Text(v)
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // Overflowing digit runs saturate; the caller only cares about sign and size.
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// Options as supplied by a caller, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub populate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<LooseInt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<LooseInt>,
}

impl RawQueryOptions {
    pub fn sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    pub fn populate(mut self, populate: impl Into<String>) -> Self {
        self.populate = Some(populate.into());
        self
    }

    pub fn limit(mut self, limit: impl Into<LooseInt>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    pub fn page(mut self, page: impl Into<LooseInt>) -> Self {
        self.page = Some(page.into());
        self
    }

    /// Normalize under `policy`.
    pub fn normalize(&self, policy: &PaginationPolicy) -> QueryOptions {
        let limit = self
            .limit
            .as_ref()
            .and_then(LooseInt::to_i64)
            .filter(|v| *v > 0)
            .map(|v| v as u64)
            .unwrap_or(policy.default_limit);
        let limit = match policy.max_limit {
            Some(max) => limit.min(max),
            None => limit,
        }
        .max(1);

        let page = self
            .page
            .as_ref()
            .and_then(LooseInt::to_i64)
            .filter(|v| *v > 0)
            .map(|v| v as u64)
            .unwrap_or(DEFAULT_PAGE);

        QueryOptions {
            sort_by: self.sort_by.as_deref().map(parse_sort_by).unwrap_or_default(),
            populate: self
                .populate
                .as_deref()
                .map(PopulateDirective::parse_list)
                .unwrap_or_default(),
            limit,
            page,
        }
    }
}

/// Defaults and bounds applied during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationPolicy {
    pub default_limit: u64,
    pub max_limit: Option<u64>,
}

/// No upper bound on `limit` unless one is set.
impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: None,
        }
    }
}

impl PaginationPolicy {
    pub fn with_max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = Some(max_limit.max(1));
        self
    }
}

/// Parse `field:asc|desc[,field:asc|desc...]`.
pub fn parse_sort_by(value: &str) -> Vec<SortKey> {
    value
        .split(',')
        .filter_map(|raw| {
            let raw = raw.trim();
            let (field, order) = match raw.split_once(':') {
                Some((field, order)) => (field.trim(), order.trim()),
                None => (raw, ""),
            };
            if field.is_empty() {
                return None;
            }
            let direction = if order.eq_ignore_ascii_case("desc") {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            };
            Some(SortKey {
                field: field.to_string(),
                direction,
            })
        })
        .collect()
}
