use chrono::{DateTime, Utc};
use nabla_query::{DefaultValue, EntitySchema, FieldDef, LooseInt, RawQueryOptions};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::User;

/// Backup records. Free-text search covers `ip`, `file` and `db`.
pub static BACKUP_SCHEMA: EntitySchema = EntitySchema::new(
    "backups",
    &[
        FieldDef::string("ip")
            .required()
            .trim()
            .lowercase()
            .searchable(),
        FieldDef::string("file").required().trim().searchable(),
        FieldDef::string("db").required().trim().searchable(),
        FieldDef::reference("user", "users").required(),
        FieldDef::number("userCount").default_value(DefaultValue::Int(0)),
        FieldDef::number("dbSize").default_value(DefaultValue::Int(0)),
        FieldDef::number("recordCount").default_value(DefaultValue::Int(0)),
        FieldDef::number("collectionCount").default_value(DefaultValue::Int(0)),
        FieldDef::string("status").one_of(&["pending", "completed", "failed"]),
    ],
)
.with_timestamps();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Pending,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }
}

/// Reference field that is either an id or, once populated, the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference<T> {
    Id(String),
    Document(Box<T>),
}

impl<T> Reference<T> {
    pub fn document(&self) -> Option<&T> {
        match self {
            Reference::Id(_) => None,
            Reference::Document(doc) => Some(doc),
        }
    }
}

impl Reference<User> {
    pub fn id(&self) -> &str {
        match self {
            Reference::Id(id) => id,
            Reference::Document(user) => &user.id,
        }
    }
}

/// A backup record as stored locally or returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    #[serde(alias = "_id")]
    pub id: String,

    /// Dump file name
    pub file: String,

    /// Backed-up database
    pub db: String,

    /// Requesting user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Reference<User>>,

    /// Client address of the request
    pub ip: String,

    #[serde(default)]
    pub user_count: u64,

    /// Data size in bytes
    #[serde(default)]
    pub db_size: u64,

    #[serde(default)]
    pub record_count: u64,

    #[serde(default)]
    pub collection_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BackupStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `POST /backups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewBackup {
    #[validate(length(min = 1, message = "db must not be empty"))]
    pub db: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[validate(length(min = 1, message = "ip must not be empty"))]
    pub ip: String,

    pub user_count: u64,
    pub db_size: u64,
    pub record_count: u64,
    pub collection_count: u64,

    /// Server hostname or droplet name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitename: Option<String>,
}

/// Query of `GET /backups`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,

    #[serde(flatten)]
    pub options: RawQueryOptions,
}

impl BackupQuery {
    pub fn search(search: impl Into<String>) -> Self {
        Self {
            search: Some(search.into()),
            options: RawQueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RawQueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Query string pairs, in a fixed order, absent values skipped.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(sort_by) = &self.options.sort_by {
            pairs.push(("sortBy", sort_by.clone()));
        }
        if let Some(populate) = &self.options.populate {
            pairs.push(("populate", populate.clone()));
        }
        if let Some(limit) = &self.options.limit {
            pairs.push(("limit", loose_to_string(limit)));
        }
        if let Some(page) = &self.options.page {
            pairs.push(("page", loose_to_string(page)));
        }
        pairs
    }
}

fn loose_to_string(value: &LooseInt) -> String {
    match value {
        LooseInt::Integer(v) => v.to_string(),
        LooseInt::Float(v) => v.to_string(),
        LooseInt::Text(v) => v.clone(),
    }
}
