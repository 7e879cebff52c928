use nabla_query::{DefaultValue, EntitySchema, FieldDef};
use serde::{Deserialize, Serialize};

/// Users own backup records.
pub static USER_SCHEMA: EntitySchema = EntitySchema::new(
    "users",
    &[
        FieldDef::string("name").required().trim().searchable(),
        FieldDef::string("email")
            .required()
            .trim()
            .lowercase()
            .searchable(),
        FieldDef::string("password").private(),
        FieldDef::string("role")
            .default_value(DefaultValue::Str("user"))
            .one_of(&["user", "admin"]),
    ],
)
.with_timestamps();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
