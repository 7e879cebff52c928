//! Client-facing JSON shape of stored documents
//!
//! Stored documents carry bookkeeping the API never exposes. The public
//! shape:
//! - private fields removed
//! - `_id` renamed to `id`
//! - `__v`, `createdAt` and `updatedAt` removed
//!
//! Populated references are shaped with the schema of their own collection.

use crate::schema::{
    EntitySchema, FieldKind, SchemaRegistry, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use serde_json::{Map, Value as JsonValue};

const VERSION_FIELD: &str = "__v";

/// Shape `doc` for output. Non-object values pass through unchanged.
pub fn to_json(registry: &SchemaRegistry, schema: &EntitySchema, doc: JsonValue) -> JsonValue {
    let JsonValue::Object(mut obj) = doc else {
        return doc;
    };

    for private in schema.private_fields() {
        obj.remove(private);
    }

    if let Some(id) = obj.remove(ID_FIELD) {
        let id = match id {
            JsonValue::String(s) => JsonValue::String(s),
            JsonValue::Null => JsonValue::Null,
            other => JsonValue::String(other.to_string()),
        };
        obj.insert("id".to_string(), id);
    }
    obj.remove(VERSION_FIELD);
    obj.remove(CREATED_AT_FIELD);
    obj.remove(UPDATED_AT_FIELD);

    shape_references(registry, schema, &mut obj);
    JsonValue::Object(obj)
}

/// Shape every document of a batch.
pub fn to_json_all(
    registry: &SchemaRegistry,
    schema: &EntitySchema,
    docs: Vec<JsonValue>,
) -> Vec<JsonValue> {
    docs.into_iter()
        .map(|doc| to_json(registry, schema, doc))
        .collect()
}

fn shape_references(
    registry: &SchemaRegistry,
    schema: &EntitySchema,
    obj: &mut Map<String, JsonValue>,
) {
    for field in schema.fields {
        let (FieldKind::Reference | FieldKind::Array, Some(target)) = (field.kind, field.reference)
        else {
            continue;
        };
        let Some(target) = registry.get(target) else {
            continue;
        };
        let Some(value) = obj.get_mut(field.name) else {
            continue;
        };
        match value {
            JsonValue::Object(_) => {
                *value = to_json(registry, target, value.take());
            }
            JsonValue::Array(items) => {
                for item in items.iter_mut().filter(|item| item.is_object()) {
                    *item = to_json(registry, target, item.take());
                }
            }
            _ => {}
        }
    }
}
