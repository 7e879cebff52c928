//! SQL for document queries.
//!
//! Documents live as JSONB bodies in one `documents` table keyed by
//! `(collection, id)`. Field paths (`user.name`) become text-array paths
//! (`body #> '{user,name}'`); every value reaches the server as a bind
//! parameter.
//!
//! Ordering mirrors the in-memory collection: values are ranked by JSON
//! type first (missing/null, number, string, object, array, boolean), then
//! compared within the type. Ties fall back to insertion order.
//!
//! Search predicates match string values, or string elements of arrays;
//! other JSON types never match.

use nabla_query::{FieldEquals, FieldMatch, QueryFilter, SortKey};
use serde_json::Value as JsonValue;

/// Bind values for `sqlx` queries.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    TextArray(Vec<String>),
    Json(JsonValue),
}

fn push_text(bind_params: &mut Vec<BindValue>, value: String) -> usize {
    bind_params.push(BindValue::Text(value));
    bind_params.len()
}

fn push_path(bind_params: &mut Vec<BindValue>, path: &str) -> usize {
    bind_params.push(BindValue::TextArray(
        path.split('.').map(str::to_string).collect(),
    ));
    bind_params.len()
}

fn push_json(bind_params: &mut Vec<BindValue>, value: JsonValue) -> usize {
    bind_params.push(BindValue::Json(value));
    bind_params.len()
}

/// Filtered, sorted and sliced query over one collection.
#[derive(Debug, Clone)]
pub struct DocumentQuery<'a> {
    collection: &'a str,
    filter: &'a QueryFilter,
    sort: &'a [SortKey],
    skip: u64,
    limit: Option<u64>,
}

impl<'a> DocumentQuery<'a> {
    pub fn new(collection: &'a str, filter: &'a QueryFilter) -> Self {
        Self {
            collection,
            filter,
            sort: &[],
            skip: 0,
            limit: None,
        }
    }

    pub fn with_sort(mut self, sort: &'a [SortKey]) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_slice(mut self, skip: u64, limit: Option<u64>) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    pub fn build_sql(&self) -> (String, Vec<BindValue>) {
        let mut sql = String::from("SELECT d.body FROM documents d");
        let mut bind_params = Vec::new();

        self.push_where(&mut sql, &mut bind_params);

        sql.push_str(" ORDER BY ");
        for key in self.sort {
            let idx = push_path(&mut bind_params, &key.field);
            let dir = if key.direction.is_ascending() {
                "ASC"
            } else {
                "DESC"
            };
            sql.push_str(&format!(
                "CASE jsonb_typeof(d.body #> ${idx}) \
                 WHEN 'number' THEN 1 WHEN 'string' THEN 2 WHEN 'object' THEN 3 \
                 WHEN 'array' THEN 4 WHEN 'boolean' THEN 5 ELSE 0 END {dir}, \
                 CASE WHEN jsonb_typeof(d.body #> ${idx}) = 'number' \
                 THEN (d.body #>> ${idx})::numeric END {dir}, \
                 (d.body #>> ${idx}) COLLATE \"C\" {dir}, "
            ));
        }
        sql.push_str("d.seq ASC");

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", to_bigint(limit)));
        }
        if self.skip > 0 {
            sql.push_str(&format!(" OFFSET {}", to_bigint(self.skip)));
        }

        (sql, bind_params)
    }

    pub fn build_count_sql(&self) -> (String, Vec<BindValue>) {
        let mut sql = String::from("SELECT COUNT(*) FROM documents d");
        let mut bind_params = Vec::new();
        self.push_where(&mut sql, &mut bind_params);
        (sql, bind_params)
    }

    fn push_where(&self, sql: &mut String, bind_params: &mut Vec<BindValue>) {
        let idx = push_text(bind_params, self.collection.to_string());
        sql.push_str(&format!(" WHERE d.collection = ${idx}"));

        for condition in &self.filter.equals {
            sql.push_str(" AND ");
            sql.push_str(&equals_clause(condition, bind_params));
        }

        let predicates = self.filter.search.predicates();
        if !predicates.is_empty() {
            let clauses: Vec<String> = predicates
                .iter()
                .map(|pred| match_clause(pred, bind_params))
                .collect();
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
        }
    }
}

/// LIMIT and OFFSET are bigint; larger values already select nothing.
fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// `ids` of `collection`, in no particular order.
pub fn build_load_by_ids_sql(collection: &str, ids: &[String]) -> (String, Vec<BindValue>) {
    let bind_params = vec![
        BindValue::Text(collection.to_string()),
        BindValue::TextArray(ids.to_vec()),
    ];
    (
        "SELECT d.body FROM documents d WHERE d.collection = $1 AND d.id = ANY($2)".to_string(),
        bind_params,
    )
}

fn equals_clause(condition: &FieldEquals, bind_params: &mut Vec<BindValue>) -> String {
    let path = push_path(bind_params, &condition.field);
    let value = push_json(bind_params, condition.value.clone());
    // Array fields match when any element equals the value
    format!(
        "(d.body #> ${path} = ${value}::jsonb \
         OR (jsonb_typeof(d.body #> ${path}) = 'array' \
         AND d.body #> ${path} @> jsonb_build_array(${value}::jsonb)))"
    )
}

fn match_clause(pred: &FieldMatch, bind_params: &mut Vec<BindValue>) -> String {
    let path = push_path(bind_params, &pred.field);
    let pattern = push_text(bind_params, pred.pattern.clone());
    format!(
        "(CASE jsonb_typeof(d.body #> ${path}) \
         WHEN 'string' THEN (d.body #>> ${path}) ~* ${pattern} \
         WHEN 'array' THEN EXISTS (SELECT 1 FROM jsonb_array_elements(d.body #> ${path}) e \
         WHERE jsonb_typeof(e) = 'string' AND (e #>> '{{}}') ~* ${pattern}) \
         ELSE false END)"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nabla_query::{SearchFilter, SortKey};
    use serde_json::json;

    fn search_filter() -> QueryFilter {
        QueryFilter::from_search(SearchFilter::AnyOf(vec![
            FieldMatch {
                field: "ip".to_string(),
                pattern: "10\\.0".to_string(),
            },
            FieldMatch {
                field: "db".to_string(),
                pattern: "10\\.0".to_string(),
            },
        ]))
    }

    #[test]
    fn count_sql_scopes_collection_and_ors_search_fields() {
        let filter = search_filter();
        let (sql, binds) = DocumentQuery::new("backups", &filter).build_count_sql();
        assert!(sql.starts_with("SELECT COUNT(*) FROM documents d WHERE d.collection = $1 AND ((CASE"));
        assert_eq!(sql.matches(" OR (CASE jsonb_typeof").count(), 1);
        assert_eq!(binds.len(), 5);
        assert_eq!(binds[0], BindValue::Text("backups".to_string()));
        assert_eq!(binds[1], BindValue::TextArray(vec!["ip".to_string()]));
        assert_eq!(binds[2], BindValue::Text("10\\.0".to_string()));
    }

    #[test]
    fn search_matches_only_strings_and_string_array_elements() {
        let filter = search_filter();
        let (sql, _) = DocumentQuery::new("backups", &filter).build_count_sql();
        assert!(sql.contains(
            "CASE jsonb_typeof(d.body #> $2) WHEN 'string' THEN (d.body #>> $2) ~* $3"
        ));
        assert!(sql.contains(
            "WHEN 'array' THEN EXISTS (SELECT 1 FROM jsonb_array_elements(d.body #> $2) e \
             WHERE jsonb_typeof(e) = 'string' AND (e #>> '{}') ~* $3)"
        ));
        assert!(sql.contains("ELSE false END"));
        assert!(!sql.contains("AND ((d.body #>> $2) ~*"));
    }

    #[test]
    fn huge_page_offsets_stay_within_bigint() {
        let filter = QueryFilter::all();
        let (sql, _) = DocumentQuery::new("backups", &filter)
            .with_slice(u64::MAX, Some(u64::MAX))
            .build_sql();
        assert!(sql.ends_with(&format!("LIMIT {} OFFSET {}", i64::MAX, i64::MAX)));
    }

    #[test]
    fn empty_filter_has_only_collection_condition() {
        let filter = QueryFilter::all();
        let (sql, binds) = DocumentQuery::new("users", &filter).build_count_sql();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM documents d WHERE d.collection = $1"
        );
        assert_eq!(binds, vec![BindValue::Text("users".to_string())]);
    }

    #[test]
    fn equality_binds_json_and_dotted_paths() {
        let filter = QueryFilter::all().with_equals("user.role", json!("admin"));
        let (sql, binds) = DocumentQuery::new("backups", &filter).build_count_sql();
        assert!(sql.contains("d.body #> $2 = $3::jsonb"));
        assert!(sql.contains("@> jsonb_build_array($3::jsonb)"));
        assert_eq!(
            binds[1],
            BindValue::TextArray(vec!["user".to_string(), "role".to_string()])
        );
        assert_eq!(binds[2], BindValue::Json(json!("admin")));
    }

    #[test]
    fn find_sql_orders_by_type_rank_then_value() {
        let filter = search_filter();
        let sort = vec![SortKey::desc("createdAt")];
        let (sql, binds) = DocumentQuery::new("backups", &filter)
            .with_sort(&sort)
            .with_slice(20, Some(10))
            .build_sql();

        assert!(sql.starts_with("SELECT d.body FROM documents d WHERE d.collection = $1"));
        assert!(sql.contains("ORDER BY CASE jsonb_typeof(d.body #> $6)"));
        assert!(sql.contains("(d.body #>> $6) COLLATE \"C\" DESC"));
        assert!(sql.ends_with("d.seq ASC LIMIT 10 OFFSET 20"));
        assert_eq!(binds[5], BindValue::TextArray(vec!["createdAt".to_string()]));
    }

    #[test]
    fn unsliced_find_has_no_limit() {
        let filter = QueryFilter::all();
        let (sql, _) = DocumentQuery::new("users", &filter).build_sql();
        assert!(sql.ends_with("ORDER BY d.seq ASC"));
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn load_by_ids_uses_any() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let (sql, binds) = build_load_by_ids_sql("users", &ids);
        assert!(sql.ends_with("d.id = ANY($2)"));
        assert_eq!(binds[1], BindValue::TextArray(ids));
    }
}
