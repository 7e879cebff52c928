//! Static entity schemas and searchable field sets
//!
//! Every collection type declares its fields once, at compile time, as an
//! `EntitySchema`. The schema answers every question the query layer needs to
//! ask about a collection:
//! - which fields take part in free-text search (`searchable_fields`)
//! - which fields are references to other collections (population)
//! - which fields are private (dropped from JSON output and CSV headers)
//! - how incoming documents are normalized before they are stored

use crate::{Error, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};

/// Field that every stored document carries.
pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    /// Id of a document in another collection
    Reference,
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Int(i64),
    Str(&'static str),
    Bool(bool),
}

impl DefaultValue {
    fn to_json(self) -> JsonValue {
        match self {
            DefaultValue::Int(v) => JsonValue::from(v),
            DefaultValue::Str(v) => JsonValue::from(v),
            DefaultValue::Bool(v) => JsonValue::from(v),
        }
    }
}

/// Declaration of a single top-level field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub searchable: bool,
    pub private: bool,
    pub required: bool,
    pub trim: bool,
    pub lowercase: bool,
    pub default: Option<DefaultValue>,
    /// Allowed values for string fields (empty = unrestricted)
    pub one_of: &'static [&'static str],
    /// Target collection for `FieldKind::Reference` fields
    pub reference: Option<&'static str>,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            searchable: false,
            private: false,
            required: false,
            trim: false,
            lowercase: false,
            default: None,
            one_of: &[],
            reference: None,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub const fn number(name: &'static str) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    /// Reference to a document of `collection`, stored as its id.
    pub const fn reference(name: &'static str, collection: &'static str) -> Self {
        let mut field = Self::new(name, FieldKind::Reference);
        field.reference = Some(collection);
        field
    }

    pub const fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub const fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub const fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub const fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    pub const fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.one_of = values;
        self
    }
}

/// Compile-time description of a collection type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySchema {
    pub collection: &'static str,
    pub fields: &'static [FieldDef],
    /// Maintain `createdAt` / `updatedAt` on write
    pub timestamps: bool,
}

impl EntitySchema {
    pub const fn new(collection: &'static str, fields: &'static [FieldDef]) -> Self {
        Self {
            collection,
            fields,
            timestamps: false,
        }
    }

    pub const fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields eligible for free-text search, in declaration order.
    pub fn searchable_fields(&self) -> Result<SearchableFieldSet> {
        SearchableFieldSet::new(
            self.fields
                .iter()
                .filter(|f| f.searchable)
                .map(|f| f.name),
        )
    }

    pub fn private_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| f.private).map(|f| f.name)
    }

    /// All public paths of a stored document: `_id`, declared non-private
    /// fields, then the timestamp fields when enabled.
    pub fn public_paths(&self) -> Vec<&'static str> {
        let mut paths = vec![ID_FIELD];
        paths.extend(self.fields.iter().filter(|f| !f.private).map(|f| f.name));
        if self.timestamps {
            paths.push(CREATED_AT_FIELD);
            paths.push(UPDATED_AT_FIELD);
        }
        paths
    }

    /// Normalize a document for storage.
    ///
    /// Applies `trim`/`lowercase`, fills defaults, enforces `required` and
    /// `one_of`, assigns `_id` when missing and maintains timestamps.
    pub fn prepare(&self, doc: JsonValue) -> Result<JsonValue> {
        let JsonValue::Object(mut obj) = doc else {
            return Err(Error::Validation(format!(
                "{} document must be a JSON object",
                self.collection
            )));
        };

        for field in self.fields {
            self.prepare_field(field, &mut obj)?;
        }

        let has_id = obj
            .get(ID_FIELD)
            .map(|v| !v.is_null())
            .unwrap_or(false);
        if !has_id {
            obj.insert(
                ID_FIELD.to_string(),
                JsonValue::from(uuid::Uuid::new_v4().simple().to_string()),
            );
        }

        if self.timestamps {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
            obj.entry(CREATED_AT_FIELD.to_string())
                .or_insert_with(|| JsonValue::from(now.clone()));
            obj.insert(UPDATED_AT_FIELD.to_string(), JsonValue::from(now));
        }

        Ok(JsonValue::Object(obj))
    }

    fn prepare_field(&self, field: &FieldDef, obj: &mut Map<String, JsonValue>) -> Result<()> {
        if let Some(JsonValue::String(s)) = obj.get_mut(field.name) {
            if field.trim {
                let trimmed = s.trim();
                if trimmed.len() != s.len() {
                    *s = trimmed.to_string();
                }
            }
            if field.lowercase {
                *s = s.to_lowercase();
            }
        }

        let missing = match obj.get(field.name) {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::String(s)) => field.required && s.is_empty(),
            Some(_) => false,
        };

        if missing {
            if let Some(default) = field.default {
                obj.insert(field.name.to_string(), default.to_json());
            } else if field.required {
                return Err(Error::Validation(format!(
                    "Path `{}` is required on {}",
                    field.name, self.collection
                )));
            } else {
                return Ok(());
            }
        }

        let Some(value) = obj.get(field.name) else {
            return Ok(());
        };

        let kind_ok = match field.kind {
            FieldKind::String | FieldKind::Reference | FieldKind::Date => {
                value.is_string() || value.is_null()
            }
            FieldKind::Number => value.is_number() || value.is_null(),
            FieldKind::Boolean => value.is_boolean() || value.is_null(),
            FieldKind::Object => value.is_object() || value.is_null(),
            FieldKind::Array => value.is_array() || value.is_null(),
        };
        if !kind_ok {
            return Err(Error::Validation(format!(
                "Path `{}` on {} expects {:?}, got {}",
                field.name, self.collection, field.kind, value
            )));
        }

        if !field.one_of.is_empty() {
            if let Some(s) = value.as_str() {
                if !field.one_of.contains(&s) {
                    return Err(Error::Validation(format!(
                        "`{}` is not a valid value for path `{}` on {}",
                        s, field.name, self.collection
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Ordered, duplicate-free list of searchable field names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchableFieldSet {
    fields: Vec<String>,
}

impl SearchableFieldSet {
    /// Build a field set, rejecting blank or duplicate names.
    pub fn new<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for field in fields {
            let field = field.into();
            if field.trim().is_empty() {
                return Err(Error::Schema(
                    "searchable field names must not be blank".to_string(),
                ));
            }
            if !seen.insert(field.clone()) {
                return Err(Error::Schema(format!(
                    "searchable field '{}' declared more than once",
                    field
                )));
            }
            out.push(field);
        }
        Ok(Self { fields: out })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.fields
    }
}

/// Lookup from collection name to schema, used to follow references.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, &'static EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, schema: &'static EntitySchema) -> Self {
        self.register(schema);
        self
    }

    pub fn register(&mut self, schema: &'static EntitySchema) {
        self.schemas.insert(schema.collection, schema);
    }

    pub fn get(&self, collection: &str) -> Option<&'static EntitySchema> {
        self.schemas.get(collection).copied()
    }

    pub fn require(&self, collection: &str) -> Result<&'static EntitySchema> {
        self.get(collection).ok_or_else(|| {
            Error::Schema(format!("no schema registered for collection '{}'", collection))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static ACCOUNTS: EntitySchema = EntitySchema::new(
        "accounts",
        &[
            FieldDef::string("name").searchable().required().trim(),
            FieldDef::string("email").searchable().trim().lowercase(),
            FieldDef::string("password").private(),
            FieldDef::number("logins").default_value(DefaultValue::Int(0)),
            FieldDef::string("state").one_of(&["active", "locked"]),
            FieldDef::reference("owner", "accounts"),
        ],
    )
    .with_timestamps();

    #[test]
    fn searchable_fields_follow_declaration_order() {
        let set = ACCOUNTS.searchable_fields().unwrap();
        assert_eq!(set.as_slice(), &["name".to_string(), "email".to_string()]);
    }

    #[test]
    fn field_set_rejects_duplicates_and_blanks() {
        assert!(matches!(
            SearchableFieldSet::new(["ip", "ip"]),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            SearchableFieldSet::new(["ip", " "]),
            Err(Error::Schema(_))
        ));
        assert!(SearchableFieldSet::new(Vec::<String>::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn public_paths_skip_private_fields() {
        assert_eq!(
            ACCOUNTS.public_paths(),
            vec!["_id", "name", "email", "logins", "state", "owner", "createdAt", "updatedAt"]
        );
    }

    #[test]
    fn prepare_normalizes_and_fills_defaults() {
        let doc = ACCOUNTS
            .prepare(json!({"name": "  Ada ", "email": " ADA@Example.COM "}))
            .unwrap();
        assert_eq!(doc["name"], "Ada");
        assert_eq!(doc["email"], "ada@example.com");
        assert_eq!(doc["logins"], 0);
        assert!(doc["_id"].is_string());
        assert!(doc["createdAt"].is_string());
        assert_eq!(doc["createdAt"], doc["updatedAt"]);
    }

    #[test]
    fn prepare_keeps_existing_id_and_created_at() {
        let doc = ACCOUNTS
            .prepare(json!({"_id": "a1", "name": "Ada", "createdAt": "2020-01-01T00:00:00Z"}))
            .unwrap();
        assert_eq!(doc["_id"], "a1");
        assert_eq!(doc["createdAt"], "2020-01-01T00:00:00Z");
    }

    #[test]
    fn prepare_enforces_required_enum_and_kind() {
        let err = ACCOUNTS.prepare(json!({"name": "   "})).unwrap_err();
        assert!(err.to_string().contains("required"));

        let err = ACCOUNTS
            .prepare(json!({"name": "Ada", "state": "gone"}))
            .unwrap_err();
        assert!(err.to_string().contains("state"));

        let err = ACCOUNTS
            .prepare(json!({"name": "Ada", "logins": "many"}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(ACCOUNTS.prepare(json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn registry_resolves_references() {
        let registry = SchemaRegistry::new().with(&ACCOUNTS);
        let owner = ACCOUNTS.field("owner").unwrap();
        let target = registry.require(owner.reference.unwrap()).unwrap();
        assert_eq!(target.collection, "accounts");
        assert!(registry.require("missing").is_err());
    }
}
