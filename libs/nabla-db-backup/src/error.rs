//! Error types for the backup SDK

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response of the backup API
    #[error("Backup API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Query error: {0}")]
    Query(#[from] nabla_query::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No database connection")]
    NotConnected,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl Error {
    /// Label used for error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::Migrate(_) => "migrate",
            Error::Http(_) => "http",
            Error::Api { .. } => "api",
            Error::Query(_) => "query",
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
            Error::NotConnected => "not_connected",
            Error::NotFound(_) => "not_found",
            Error::Json(_) => "json",
            Error::Other(_) => "other",
        }
    }
}
