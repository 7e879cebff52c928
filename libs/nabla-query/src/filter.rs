//! Search filters
//!
//! A free-text search string becomes a disjunction over the searchable
//! fields of a collection: `field contains <search>`, case-insensitive,
//! unanchored. The search string is a regular expression source; it is not
//! escaped unless the builder is told to (`FilterBuilder::escape_regex`).
//!
//! `QueryFilter` adds optional equality conditions (the base filter of a
//! paginated query) that are ANDed with the search disjunction.

use crate::path::lookup;
use crate::schema::SearchableFieldSet;
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value as JsonValue};

/// Single-field predicate: `field` matches `pattern`, case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field: String,
    pub pattern: String,
}

/// Free-text search predicate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchFilter {
    /// Matches every document
    #[default]
    Empty,
    /// Matches when any of the field predicates matches
    AnyOf(Vec<FieldMatch>),
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        matches!(self, SearchFilter::Empty)
    }

    pub fn predicates(&self) -> &[FieldMatch] {
        match self {
            SearchFilter::Empty => &[],
            SearchFilter::AnyOf(preds) => preds,
        }
    }
}

/// Equality condition `field = value`.
///
/// Array-valued fields match when any element equals `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEquals {
    pub field: String,
    pub value: JsonValue,
}

/// Complete predicate of a query: equality conditions AND search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryFilter {
    pub equals: Vec<FieldEquals>,
    pub search: SearchFilter,
}

impl QueryFilter {
    /// Filter that matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_search(search: SearchFilter) -> Self {
        Self {
            equals: Vec::new(),
            search,
        }
    }

    /// Build equality conditions from a JSON object.
    ///
    /// Entries whose value is the empty string are dropped, so a form with
    /// blank inputs does not constrain the query.
    pub fn from_base(base: &Map<String, JsonValue>) -> Self {
        let equals = base
            .iter()
            .filter(|(_, v)| v.as_str() != Some(""))
            .map(|(k, v)| FieldEquals {
                field: k.clone(),
                value: v.clone(),
            })
            .collect();
        Self {
            equals,
            search: SearchFilter::Empty,
        }
    }

    pub fn with_search(mut self, search: SearchFilter) -> Self {
        self.search = search;
        self
    }

    pub fn with_equals(mut self, field: impl Into<String>, value: JsonValue) -> Self {
        self.equals.push(FieldEquals {
            field: field.into(),
            value,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.search.is_empty()
    }
}

/// Builds `SearchFilter`s from raw search strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterBuilder {
    escape_regex: bool,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat the search string as literal text instead of a pattern.
    pub fn escape_regex(mut self, escape: bool) -> Self {
        self.escape_regex = escape;
        self
    }

    pub fn escapes_regex(&self) -> bool {
        self.escape_regex
    }

    /// Build the search predicate for `search` over `fields`.
    ///
    /// An absent or empty search yields `SearchFilter::Empty`. A non-empty
    /// search against an empty field set is a schema error: the collection
    /// declared nothing to search. Patterns are checked here so every
    /// backend reports a bad pattern as `InvalidSearch`.
    pub fn build(&self, search: Option<&str>, fields: &SearchableFieldSet) -> Result<SearchFilter> {
        let Some(search) = search.filter(|s| !s.is_empty()) else {
            return Ok(SearchFilter::Empty);
        };

        if fields.is_empty() {
            return Err(Error::Schema(
                "collection declares no searchable fields".to_string(),
            ));
        }

        let pattern = if self.escape_regex {
            regex::escape(search)
        } else {
            search.to_string()
        };
        compile_pattern(&pattern)?;

        Ok(SearchFilter::AnyOf(
            fields
                .iter()
                .map(|field| FieldMatch {
                    field: field.to_string(),
                    pattern: pattern.clone(),
                })
                .collect(),
        ))
    }
}

/// `QueryFilter` with its patterns compiled, for in-process evaluation.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    equals: Vec<FieldEquals>,
    any_of: Vec<(String, Regex)>,
}

impl CompiledFilter {
    pub fn compile(filter: &QueryFilter) -> Result<Self> {
        let mut any_of = Vec::with_capacity(filter.search.predicates().len());
        for pred in filter.search.predicates() {
            any_of.push((pred.field.clone(), compile_pattern(&pred.pattern)?));
        }
        Ok(Self {
            equals: filter.equals.clone(),
            any_of,
        })
    }

    pub fn matches(&self, doc: &JsonValue) -> bool {
        let equals_ok = self
            .equals
            .iter()
            .all(|cond| equals_matches(lookup(doc, &cond.field), &cond.value));
        if !equals_ok {
            return false;
        }
        if self.any_of.is_empty() {
            return true;
        }
        self.any_of
            .iter()
            .any(|(field, regex)| regex_matches(lookup(doc, field), regex))
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| Error::InvalidSearch {
            pattern: pattern.to_string(),
            source,
        })
}

fn equals_matches(value: Option<&JsonValue>, expected: &JsonValue) -> bool {
    match value {
        // Missing fields compare equal to null
        None => expected.is_null(),
        Some(v) if v == expected => true,
        Some(JsonValue::Array(items)) => items.iter().any(|item| item == expected),
        Some(_) => false,
    }
}

fn regex_matches(value: Option<&JsonValue>, regex: &Regex) -> bool {
    match value {
        Some(JsonValue::String(s)) => regex.is_match(s),
        Some(JsonValue::Array(items)) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|s| regex.is_match(s))),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> SearchableFieldSet {
        SearchableFieldSet::new(names.iter().copied()).unwrap()
    }

    fn compiled(search: &str, names: &[&str]) -> CompiledFilter {
        let search = FilterBuilder::new().build(Some(search), &fields(names)).unwrap();
        CompiledFilter::compile(&QueryFilter::from_search(search)).unwrap()
    }

    #[test]
    fn empty_or_absent_search_matches_everything() {
        let set = fields(&["ip", "file", "db"]);
        assert_eq!(
            FilterBuilder::new().build(None, &set).unwrap(),
            SearchFilter::Empty
        );
        assert_eq!(
            FilterBuilder::new().build(Some(""), &set).unwrap(),
            SearchFilter::Empty
        );

        let all = CompiledFilter::compile(&QueryFilter::all()).unwrap();
        assert!(all.matches(&json!({})));
        assert!(all.matches(&json!({"ip": "10.0.0.1"})));
    }

    #[test]
    fn builds_one_predicate_per_searchable_field() {
        let filter = FilterBuilder::new()
            .build(Some("mongo"), &fields(&["ip", "file", "db"]))
            .unwrap();
        let preds = filter.predicates();
        assert_eq!(preds.len(), 3);
        assert_eq!(
            preds.iter().map(|p| p.field.as_str()).collect::<Vec<_>>(),
            vec!["ip", "file", "db"]
        );
        assert!(preds.iter().all(|p| p.pattern == "mongo"));
    }

    #[test]
    fn matches_case_insensitive_substring_on_any_field() {
        let filter = compiled("alice", &["name", "email"]);
        assert!(filter.matches(&json!({"name": "Alice Smith", "email": "a@x.com"})));
        assert!(filter.matches(&json!({"name": "Bob", "email": "ALICE@x.com"})));
        assert!(!filter.matches(&json!({"name": "Bob", "email": "b@x.com"})));
    }

    #[test]
    fn non_string_values_never_match() {
        let filter = compiled("1", &["count", "tags"]);
        assert!(!filter.matches(&json!({"count": 1})));
        assert!(filter.matches(&json!({"tags": ["a", "b1"]})));
        assert!(!filter.matches(&json!({"tags": [1, 2]})));
    }

    #[test]
    fn dotted_fields_reach_nested_values() {
        let filter = compiled("acme", &["owner.company"]);
        assert!(filter.matches(&json!({"owner": {"company": "ACME corp"}})));
        assert!(!filter.matches(&json!({"owner": "acme"})));
    }

    #[test]
    fn regex_metacharacters_are_live_by_default() {
        let filter = compiled("db.*prod", &["db"]);
        assert!(filter.matches(&json!({"db": "db-eu-prod"})));
        assert!(!filter.matches(&json!({"db": "prod-db"})));

        let dot = compiled("a.c", &["file"]);
        assert!(dot.matches(&json!({"file": "abc"})));
    }

    #[test]
    fn escaping_makes_search_literal() {
        let set = fields(&["file"]);
        let search = FilterBuilder::new()
            .escape_regex(true)
            .build(Some("a.c"), &set)
            .unwrap();
        let filter = CompiledFilter::compile(&QueryFilter::from_search(search)).unwrap();
        assert!(!filter.matches(&json!({"file": "abc"})));
        assert!(filter.matches(&json!({"file": "backup-A.C.gz"})));
    }

    #[test]
    fn invalid_pattern_is_rejected_by_the_builder() {
        let err = FilterBuilder::new()
            .build(Some("(unclosed"), &fields(&["db"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSearch { ref pattern, .. } if pattern == "(unclosed"));

        // Escaped, the same text is a valid literal
        assert!(FilterBuilder::new()
            .escape_regex(true)
            .build(Some("(unclosed"), &fields(&["db"]))
            .is_ok());
    }

    #[test]
    fn hand_built_invalid_pattern_is_rejected_at_compile() {
        let search = SearchFilter::AnyOf(vec![FieldMatch {
            field: "db".to_string(),
            pattern: "[".to_string(),
        }]);
        let err = CompiledFilter::compile(&QueryFilter::from_search(search)).unwrap_err();
        assert!(matches!(err, Error::InvalidSearch { .. }));
    }

    #[test]
    fn search_without_searchable_fields_is_a_schema_error() {
        let err = FilterBuilder::new()
            .build(Some("x"), &SearchableFieldSet::default())
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        // No search, no fields: fine.
        assert!(FilterBuilder::new()
            .build(None, &SearchableFieldSet::default())
            .is_ok());
    }

    #[test]
    fn base_filter_drops_empty_strings_and_ands_with_search() {
        let base = json!({"status": "completed", "db": ""});
        let filter = QueryFilter::from_base(base.as_object().unwrap()).with_search(
            FilterBuilder::new()
                .build(Some("10.0"), &fields(&["ip"]))
                .unwrap(),
        );
        assert_eq!(filter.equals.len(), 1);

        let compiled = CompiledFilter::compile(&filter).unwrap();
        assert!(compiled.matches(&json!({"status": "completed", "ip": "10.0.0.1", "db": "x"})));
        assert!(!compiled.matches(&json!({"status": "failed", "ip": "10.0.0.1"})));
        assert!(!compiled.matches(&json!({"status": "completed", "ip": "192.168.0.1"})));
    }

    #[test]
    fn equality_matches_array_elements() {
        let filter = CompiledFilter::compile(&QueryFilter::all().with_equals("tags", json!("nightly")))
            .unwrap();
        assert!(filter.matches(&json!({"tags": ["weekly", "nightly"]})));
        assert!(!filter.matches(&json!({"tags": ["weekly"]})));
    }
}
