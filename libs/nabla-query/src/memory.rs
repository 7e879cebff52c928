//! In-memory document store
//!
//! A complete `Collection` backend kept in process memory. Evaluation
//! follows the same rules as the database backends: case-insensitive regex
//! search, equality with array membership, values of mixed types ordered
//! null < number < string < object < array < boolean.

use crate::collection::Collection;
use crate::filter::CompiledFilter;
use crate::options::SortKey;
use crate::path::{document_id, lookup};
use crate::plan::{CountQuery, FindQuery};
use crate::populate::{DocumentSource, Populator};
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<HashMap<String, Vec<JsonValue>>>>,
    registry: Arc<SchemaRegistry>,
}

impl MemoryStore {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            docs: Arc::default(),
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Normalize `doc` against `schema` and store it. Returns the stored
    /// document.
    pub async fn insert(&self, schema: &'static EntitySchema, doc: JsonValue) -> Result<JsonValue> {
        let doc = schema.prepare(doc)?;
        self.docs
            .write()
            .await
            .entry(schema.collection.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    pub async fn insert_many(
        &self,
        schema: &'static EntitySchema,
        docs: impl IntoIterator<Item = JsonValue>,
    ) -> Result<Vec<JsonValue>> {
        let prepared = docs
            .into_iter()
            .map(|doc| schema.prepare(doc))
            .collect::<Result<Vec<_>>>()?;
        self.docs
            .write()
            .await
            .entry(schema.collection.to_string())
            .or_default()
            .extend(prepared.iter().cloned());
        Ok(prepared)
    }

    pub fn collection(&self, schema: &'static EntitySchema) -> MemoryCollection {
        MemoryCollection {
            store: self.clone(),
            schema,
        }
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.docs.read().await.get(collection).map_or(0, Vec::len)
    }
}

#[async_trait]
impl DocumentSource for MemoryStore {
    async fn load_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<JsonValue>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let docs = self.docs.read().await;
        Ok(docs
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| document_id(doc).is_some_and(|id| wanted.contains(id.as_str())))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Clone)]
pub struct MemoryCollection {
    store: MemoryStore,
    schema: &'static EntitySchema,
}

impl MemoryCollection {
    async fn matching(&self, filter: &CompiledFilter) -> Vec<JsonValue> {
        let docs = self.store.docs.read().await;
        docs.get(self.schema.collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    async fn count_documents(&self, query: &CountQuery) -> Result<u64> {
        let filter = CompiledFilter::compile(&query.filter)?;
        let docs = self.store.docs.read().await;
        Ok(docs
            .get(self.schema.collection)
            .map_or(0, |docs| docs.iter().filter(|doc| filter.matches(doc)).count()) as u64)
    }

    async fn find(&self, query: &FindQuery) -> Result<Vec<JsonValue>> {
        let filter = CompiledFilter::compile(&query.filter)?;
        // Filtering and population take separate read locks; a find is not a snapshot.
        let mut docs = self.matching(&filter).await;

        if !query.sort.is_empty() {
            docs.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let mut docs: Vec<JsonValue> = match query.limit {
            Some(limit) => docs
                .into_iter()
                .skip(skip)
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => docs.into_iter().skip(skip).collect(),
        };

        if !query.populate.is_empty() {
            Populator::new(&self.store.registry, &self.store)
                .populate(self.schema, &mut docs, &query.populate)
                .await?;
        }
        Ok(docs)
    }
}

fn compare_documents(a: &JsonValue, b: &JsonValue, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ordering = compare_values(lookup(a, &key.field), lookup(b, &key.field));
        let ordering = if key.direction.is_ascending() {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn type_rank(value: Option<&JsonValue>) -> u8 {
    match value {
        None | Some(JsonValue::Null) => 0,
        Some(JsonValue::Number(_)) => 1,
        Some(JsonValue::String(_)) => 2,
        Some(JsonValue::Object(_)) => 3,
        Some(JsonValue::Array(_)) => 4,
        Some(JsonValue::Bool(_)) => 5,
    }
}

/// Total order over optional JSON values used for sorting.
pub(crate) fn compare_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (Some(x), Some(y))
            if type_rank(a) == type_rank(b)
                && matches!(x, JsonValue::Object(_) | JsonValue::Array(_)) =>
        {
            x.to_string().cmp(&y.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::QueryFilter;
    use crate::schema::FieldDef;
    use serde_json::json;

    static ITEMS: EntitySchema = EntitySchema::new(
        "items",
        &[FieldDef::string("name").searchable(), FieldDef::number("rank")],
    )
    .with_timestamps();

    #[test]
    fn mixed_types_order_like_a_document_database() {
        let mut values = vec![
            json!(true),
            json!([1]),
            json!({"a": 1}),
            json!("b"),
            json!("a"),
            json!(2),
            json!(1.5),
            JsonValue::Null,
        ];
        values.sort_by(|a, b| compare_values(Some(a), Some(b)));
        assert_eq!(
            values,
            vec![
                JsonValue::Null,
                json!(1.5),
                json!(2),
                json!("a"),
                json!("b"),
                json!({"a": 1}),
                json!([1]),
                json!(true),
            ]
        );
        assert_eq!(compare_values(None, Some(&JsonValue::Null)), Ordering::Equal);
    }

    #[tokio::test]
    async fn find_sorts_slices_and_counts() {
        let store = MemoryStore::new(SchemaRegistry::new().with(&ITEMS));
        for (name, rank) in [("c", 3), ("a", 1), ("b", 2), ("d", 2)] {
            store
                .insert(&ITEMS, json!({"name": name, "rank": rank}))
                .await
                .unwrap();
        }
        let items = store.collection(&ITEMS);

        let mut query = FindQuery::all(QueryFilter::all());
        query.sort = vec![SortKey::desc("rank"), SortKey::asc("name")];
        query.skip = 1;
        query.limit = Some(2);
        let names: Vec<_> = items
            .find(&query)
            .await
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b", "d"]);

        let count = items
            .count_documents(&CountQuery {
                filter: QueryFilter::all().with_equals("rank", json!(2)),
            })
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.len("items").await, 4);
    }

    #[tokio::test]
    async fn insert_assigns_id_and_timestamps() {
        let store = MemoryStore::new(SchemaRegistry::new().with(&ITEMS));
        let doc = store.insert(&ITEMS, json!({"name": "x"})).await.unwrap();
        assert!(doc["_id"].is_string());
        assert!(doc["createdAt"].is_string());
        assert_eq!(doc["createdAt"], doc["updatedAt"]);

        let loaded = store
            .load_by_ids("items", &[doc["_id"].as_str().unwrap().to_string()])
            .await
            .unwrap();
        assert_eq!(loaded, vec![doc]);
    }
}
