//! PostgreSQL document store
//!
//! Collections are rows of one `documents` table with a JSONB body. Queries
//! are built by [`DocumentQuery`]; population goes through the shared
//! [`Populator`] with the store itself as the document source.

mod query_builder;

pub use query_builder::{build_load_by_ids_sql, BindValue, DocumentQuery};

use crate::metrics::{DB_QUERY_DURATION_SECONDS, DB_QUERY_ERRORS_TOTAL};
use crate::{Error, Result};
use async_trait::async_trait;
use nabla_query::{
    Collection, CountQuery, DocumentSource, EntitySchema, FindQuery, Populator, SchemaRegistry,
};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    registry: Arc<SchemaRegistry>,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, registry: SchemaRegistry) -> Self {
        Self {
            pool,
            registry: Arc::new(registry),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("Document store migrations applied");
        Ok(())
    }

    /// Normalize `doc` against `schema` and store it, replacing any document
    /// with the same `_id`. Returns the stored document.
    pub async fn insert(&self, schema: &'static EntitySchema, doc: JsonValue) -> Result<JsonValue> {
        let doc = schema.prepare(doc)?;
        let id = doc
            .get("_id")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Validation("document _id must be a string".to_string()))?;

        let start = Instant::now();
        let result = sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()",
        )
        .bind(schema.collection)
        .bind(&id)
        .bind(&doc)
        .execute(&self.pool)
        .await;
        observe("insert", start, result.is_ok());
        result?;

        Ok(doc)
    }

    pub async fn delete(&self, schema: &'static EntitySchema, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(schema.collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub fn collection(&self, schema: &'static EntitySchema) -> PgCollection {
        PgCollection {
            store: self.clone(),
            schema,
        }
    }
}

#[async_trait]
impl DocumentSource for PgDocumentStore {
    async fn load_by_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> nabla_query::Result<Vec<JsonValue>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (sql, bind_values) = build_load_by_ids_sql(collection, ids);
        let mut query = sqlx::query_scalar::<_, JsonValue>(&sql);
        for value in bind_values {
            query = match value {
                BindValue::Text(v) => query.bind(v),
                BindValue::TextArray(vs) => query.bind(vs),
                BindValue::Json(v) => query.bind(v),
            };
        }

        let start = Instant::now();
        let result = query.fetch_all(&self.pool).await;
        observe("load_by_ids", start, result.is_ok());
        result.map_err(nabla_query::Error::collection)
    }
}

/// One collection of a [`PgDocumentStore`].
#[derive(Clone)]
pub struct PgCollection {
    store: PgDocumentStore,
    schema: &'static EntitySchema,
}

#[async_trait]
impl Collection for PgCollection {
    fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    async fn count_documents(&self, query: &CountQuery) -> nabla_query::Result<u64> {
        let (sql, bind_values) =
            DocumentQuery::new(self.schema.collection, &query.filter).build_count_sql();

        let mut count_query = sqlx::query_scalar::<_, i64>(&sql);
        for value in bind_values {
            count_query = match value {
                BindValue::Text(v) => count_query.bind(v),
                BindValue::TextArray(vs) => count_query.bind(vs),
                BindValue::Json(v) => count_query.bind(v),
            };
        }

        // Own connection so a concurrent find does not queue behind the count
        let mut conn = self
            .store
            .pool
            .acquire()
            .await
            .map_err(nabla_query::Error::collection)?;

        let start = Instant::now();
        let result = count_query.fetch_one(&mut *conn).await;
        observe("count", start, result.is_ok());
        let total = result.map_err(nabla_query::Error::collection)?;

        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn find(&self, query: &FindQuery) -> nabla_query::Result<Vec<JsonValue>> {
        let (sql, bind_values) = DocumentQuery::new(self.schema.collection, &query.filter)
            .with_sort(&query.sort)
            .with_slice(query.skip, query.limit)
            .build_sql();

        let mut find_query = sqlx::query_scalar::<_, JsonValue>(&sql);
        for value in bind_values {
            find_query = match value {
                BindValue::Text(v) => find_query.bind(v),
                BindValue::TextArray(vs) => find_query.bind(vs),
                BindValue::Json(v) => find_query.bind(v),
            };
        }

        let mut conn = self
            .store
            .pool
            .acquire()
            .await
            .map_err(nabla_query::Error::collection)?;

        let start = Instant::now();
        let result = find_query.fetch_all(&mut *conn).await;
        observe("find", start, result.is_ok());
        let mut docs = result.map_err(nabla_query::Error::collection)?;
        drop(conn);

        if !query.populate.is_empty() {
            Populator::new(&self.store.registry, &self.store)
                .populate(self.schema, &mut docs, &query.populate)
                .await?;
        }

        Ok(docs)
    }
}

fn observe(query_type: &str, start: Instant, ok: bool) {
    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[query_type])
        .observe(start.elapsed().as_secs_f64());
    if !ok {
        DB_QUERY_ERRORS_TOTAL.with_label_values(&[query_type]).inc();
    }
}
