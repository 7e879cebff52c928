//! Reference population
//!
//! A populate spec such as `"user.team,schedule"` names reference fields to
//! replace with the documents they point at. Each comma-separated entry is
//! independent; a dotted entry chains: `user.team` populates `user`, then
//! `team` on the loaded users.

use crate::path::document_id;
use crate::schema::{EntitySchema, FieldKind, SchemaRegistry};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// One population step, optionally followed by a nested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateDirective {
    pub path: String,
    pub populate: Option<Box<PopulateDirective>>,
}

impl PopulateDirective {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            populate: None,
        }
    }

    pub fn then(mut self, nested: PopulateDirective) -> Self {
        self.populate = Some(Box::new(nested));
        self
    }

    /// Parse a comma-separated populate spec. Blank entries are skipped.
    pub fn parse_list(spec: &str) -> Vec<PopulateDirective> {
        spec.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::parse_chain)
            .collect()
    }

    /// Parse one dotted chain: `a.b.c` becomes `a -> b -> c`.
    ///
    /// Empty segments (`a.`, `.a`, `a..b`) are kept as empty paths and
    /// rejected when the directive is resolved against a schema.
    pub fn parse_chain(chain: &str) -> PopulateDirective {
        let mut segments = chain.split('.').rev();
        // `split` always yields at least one segment
        let last = PopulateDirective::new(segments.next().unwrap_or_default().trim());
        segments.fold(last, |nested, segment| {
            PopulateDirective::new(segment.trim()).then(nested)
        })
    }

    /// Depth of the chain, 1 for a single step.
    pub fn depth(&self) -> usize {
        1 + self.populate.as_ref().map_or(0, |nested| nested.depth())
    }
}

/// Loads documents of any collection by id.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Documents of `collection` whose `_id` is in `ids`. Unknown ids are
    /// simply absent from the result; order is not significant.
    async fn load_by_ids(&self, collection: &str, ids: &[String]) -> Result<Vec<JsonValue>>;
}

/// Expands populate directives over a batch of documents.
pub struct Populator<'a> {
    registry: &'a SchemaRegistry,
    source: &'a dyn DocumentSource,
}

impl<'a> Populator<'a> {
    pub fn new(registry: &'a SchemaRegistry, source: &'a dyn DocumentSource) -> Self {
        Self { registry, source }
    }

    /// Populate every directive on `docs`, in place.
    ///
    /// All directives are resolved against the schemas before anything is
    /// loaded, so a bad path fails even when `docs` is empty.
    pub async fn populate(
        &self,
        schema: &'static EntitySchema,
        docs: &mut [JsonValue],
        directives: &[PopulateDirective],
    ) -> Result<()> {
        for directive in directives {
            self.resolve(schema, directive)?;
        }
        if docs.is_empty() {
            return Ok(());
        }
        for directive in directives {
            self.expand(schema, docs, directive).await?;
        }
        Ok(())
    }

    fn resolve(&self, schema: &'static EntitySchema, directive: &PopulateDirective) -> Result<()> {
        let target = self.target_schema(schema, &directive.path)?;
        match &directive.populate {
            Some(nested) => self.resolve(target, nested),
            None => Ok(()),
        }
    }

    fn target_schema(
        &self,
        schema: &'static EntitySchema,
        path: &str,
    ) -> Result<&'static EntitySchema> {
        if path.is_empty() {
            return Err(Error::Populate(format!(
                "empty populate path on {}",
                schema.collection
            )));
        }
        let field = schema.field(path).ok_or_else(|| {
            Error::Populate(format!(
                "cannot populate unknown path '{}' on {}",
                path, schema.collection
            ))
        })?;
        let target = match (field.kind, field.reference) {
            (FieldKind::Reference | FieldKind::Array, Some(target)) => target,
            _ => {
                return Err(Error::Populate(format!(
                    "path '{}' on {} is not a reference",
                    path, schema.collection
                )))
            }
        };
        self.registry.require(target)
    }

    fn expand<'s>(
        &'s self,
        schema: &'static EntitySchema,
        docs: &'s mut [JsonValue],
        directive: &'s PopulateDirective,
    ) -> BoxFuture<'s, Result<()>> {
        async move {
            let target = self.target_schema(schema, &directive.path)?;

            let mut seen = HashSet::new();
            let mut ids = Vec::new();
            for doc in docs.iter() {
                for id in reference_ids(doc.get(&directive.path)) {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
            }
            if ids.is_empty() {
                return Ok(());
            }

            let mut loaded = self.source.load_by_ids(target.collection, &ids).await?;
            tracing::trace!(
                collection = target.collection,
                path = %directive.path,
                requested = ids.len(),
                loaded = loaded.len(),
                "Populated reference"
            );

            if let Some(nested) = &directive.populate {
                self.expand(target, &mut loaded, nested).await?;
            }

            let by_id: HashMap<String, JsonValue> = loaded
                .into_iter()
                .filter_map(|doc| document_id(&doc).map(|id| (id, doc)))
                .collect();

            for doc in docs.iter_mut() {
                let Some(value) = doc
                    .as_object_mut()
                    .and_then(|obj| obj.get_mut(&directive.path))
                else {
                    continue;
                };
                replace_references(value, &by_id);
            }
            Ok(())
        }
        .boxed()
    }
}

fn reference_ids(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::String(id)) => vec![id.clone()],
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// A dangling single reference becomes null; dangling array entries are dropped.
fn replace_references(value: &mut JsonValue, by_id: &HashMap<String, JsonValue>) {
    match value {
        JsonValue::String(id) => {
            *value = by_id.get(id.as_str()).cloned().unwrap_or(JsonValue::Null);
        }
        JsonValue::Array(items) => {
            let populated = items
                .drain(..)
                .filter_map(|item| match item {
                    JsonValue::String(id) => by_id.get(&id).cloned(),
                    other => Some(other),
                })
                .collect();
            *items = populated;
        }
        _ => {}
    }
}
