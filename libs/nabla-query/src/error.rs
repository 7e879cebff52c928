//! Error types for nabla-query

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error raised by a collection backend (driver, network, server).
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid schema declaration (searchable fields, references).
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid search pattern '{pattern}': {source}")]
    InvalidSearch {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Populate error: {0}")]
    Populate(String),

    /// Failure reported by the underlying collection, passed through unchanged.
    #[error("Collection error: {0}")]
    Collection(#[source] BackendError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a backend error.
    pub fn collection<E>(err: E) -> Self
    where
        E: Into<BackendError>,
    {
        Self::Collection(err.into())
    }
}
