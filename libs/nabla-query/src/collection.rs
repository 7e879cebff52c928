use crate::plan::{CountQuery, FindQuery};
use crate::schema::{EntitySchema, SearchableFieldSet};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// A queryable collection of documents of one schema.
///
/// `count_documents` and `find` must be safe to run concurrently; pages
/// issue both at once.
#[async_trait]
pub trait Collection: Send + Sync {
    fn schema(&self) -> &'static EntitySchema;

    fn searchable_fields(&self) -> Result<SearchableFieldSet> {
        self.schema().searchable_fields()
    }

    async fn count_documents(&self, query: &CountQuery) -> Result<u64>;

    /// Matching documents, sorted, sliced and populated as requested.
    async fn find(&self, query: &FindQuery) -> Result<Vec<JsonValue>>;
}

#[async_trait]
impl<C: Collection + ?Sized> Collection for std::sync::Arc<C> {
    fn schema(&self) -> &'static EntitySchema {
        (**self).schema()
    }

    fn searchable_fields(&self) -> Result<SearchableFieldSet> {
        (**self).searchable_fields()
    }

    async fn count_documents(&self, query: &CountQuery) -> Result<u64> {
        (**self).count_documents(query).await
    }

    async fn find(&self, query: &FindQuery) -> Result<Vec<JsonValue>> {
        (**self).find(query).await
    }
}
