#![allow(dead_code)]

use async_trait::async_trait;
use nabla_query::{
    Collection, CountQuery, EntitySchema, Error, FieldDef, FindQuery, MemoryCollection,
    MemoryStore, SchemaRegistry,
};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicUsize, Ordering};

pub static TEAMS: EntitySchema = EntitySchema::new(
    "teams",
    &[FieldDef::string("name").searchable()],
);

pub static USERS: EntitySchema = EntitySchema::new(
    "users",
    &[
        FieldDef::string("name").searchable(),
        FieldDef::string("email").searchable(),
        FieldDef::string("password").private(),
        FieldDef::reference("team", "teams"),
    ],
)
.with_timestamps();

pub static NOTES: EntitySchema = EntitySchema::new(
    "notes",
    &[
        FieldDef::string("title").searchable(),
        FieldDef::number("seq"),
        FieldDef::reference("author", "users"),
        FieldDef::reference("editor", "users"),
    ],
)
.with_timestamps();

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new().with(&TEAMS).with(&USERS).with(&NOTES)
}

/// Store holding `n` notes titled `note-00..`, created in `seq` order.
pub async fn store_with_notes(n: usize) -> MemoryStore {
    let store = MemoryStore::new(registry());
    for seq in 0..n {
        store
            .insert(
                &NOTES,
                json!({
                    "title": format!("note-{seq:02}"),
                    "seq": seq,
                    "createdAt": format!("2024-01-01T00:00:{seq:02}.000000Z")
                }),
            )
            .await
            .expect("insert note");
    }
    store
}

/// Collection whose every call fails, counting calls.
pub struct FailingCollection {
    pub calls: AtomicUsize,
}

impl FailingCollection {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("connection reset by peer")]
pub struct DriverError;

#[async_trait]
impl Collection for FailingCollection {
    fn schema(&self) -> &'static EntitySchema {
        &NOTES
    }

    async fn count_documents(&self, _query: &CountQuery) -> nabla_query::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::collection(DriverError))
    }

    async fn find(&self, _query: &FindQuery) -> nabla_query::Result<Vec<JsonValue>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

pub fn titles(results: &[JsonValue]) -> Vec<String> {
    results
        .iter()
        .map(|doc| doc["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

pub fn notes(store: &MemoryStore) -> MemoryCollection {
    store.collection(&NOTES)
}
