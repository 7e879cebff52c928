//! Configuration loading
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. `config.{toml,yaml,json}` in the working directory (optional)
//! 3. Environment variables prefixed `NABLA_`, nested with `__`
//!    (`NABLA_DATABASE__URL`, `NABLA_API__KEY`, `NABLA_LOGGING__LEVEL`)
//!
//! A `.env` file is loaded into the process environment first.

use crate::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub env: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub search: SearchConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    /// Used instead of `url` by integration tests when set
    pub test_database_url: Option<String>,
    pub pool_min_size: u32,
    /// Defaults to `2 * CPUs + 1`
    pub pool_max_size: Option<u32>,
    pub pool_timeout_seconds: u64,
    pub statement_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/nabla-db-backup".to_string(),
            test_database_url: None,
            pool_min_size: 2,
            pool_max_size: None,
            pool_timeout_seconds: 30,
            statement_timeout_seconds: 30,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn effective_pool_max_size(&self) -> u32 {
        self.pool_max_size
            .unwrap_or_else(default_pool_max_size)
            .max(self.pool_min_size)
            .max(1)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_seconds)
    }
}

/// `2 * CPUs + 1`
pub fn default_pool_max_size() -> u32 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    u32::try_from(cpus * 2 + 1).unwrap_or(u32::MAX)
}

/// Remote backup API client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Used when `base_url` is empty: `http://localhost:{base_port}/v1`
    pub base_port: u16,
    /// Sent as the `x-nabla` header
    pub key: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Server hostname or droplet name sent with backup requests
    pub hostname: Option<String>,
    /// Site name of the API, sent with backup requests
    pub sitename: Option<String>,
    /// Client address recorded on backup requests
    pub client_ip: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000/v1".to_string(),
            base_port: 4000,
            key: String::new(),
            user_agent: format!("Nabla-{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: 30,
            hostname: None,
            sitename: None,
            client_ip: "127.0.0.1".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn effective_base_url(&self) -> String {
        if self.base_url.trim().is_empty() {
            format!("http://localhost:{}/v1", self.base_port)
        } else {
            self.base_url.trim_end_matches('/').to_string()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: u64,
    /// Upper bound on `limit`; 0 leaves it unbounded
    pub max_limit: u64,
    /// Treat search strings as literal text instead of regular expressions
    pub escape_regex: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: nabla_query::options::DEFAULT_LIMIT,
            max_limit: 0,
            escape_regex: false,
        }
    }
}

impl SearchConfig {
    pub fn policy(&self) -> nabla_query::PaginationPolicy {
        let policy = nabla_query::PaginationPolicy {
            default_limit: self.default_limit.max(1),
            ..Default::default()
        };
        match self.max_limit {
            0 => policy,
            max => policy.with_max_limit(max),
        }
    }

    pub fn filter_builder(&self) -> nabla_query::FilterBuilder {
        nabla_query::FilterBuilder::new().escape_regex(self.escape_regex)
    }
}

/// Connection diagnostics, for debugging only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file_enabled: bool,
    pub file_directory: String,
    pub file_prefix: String,
    /// daily, hourly, minutely or never
    pub file_rotation: String,
    pub opentelemetry_enabled: bool,
    pub otlp_endpoint: String,
    pub otlp_timeout_seconds: u64,
    pub trace_sample_ratio: f64,
    pub service_name: String,
    pub service_version: Option<String>,
    pub deployment_environment: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_enabled: false,
            file_directory: "logs".to_string(),
            file_prefix: "nabla".to_string(),
            file_rotation: "daily".to_string(),
            opentelemetry_enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            otlp_timeout_seconds: 10,
            trace_sample_ratio: 1.0,
            service_name: "nabla-db-backup".to_string(),
            service_version: None,
            deployment_environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load from `.env`, the optional config file and `NABLA_*` variables.
    pub fn load() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(environment_source());
        Self::from_builder(builder)
    }

    pub(crate) fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.for_environment()
    }

    /// Test runs never touch the regular database: `test_database_url`
    /// when given, otherwise the database name suffixed with `-test`.
    fn for_environment(mut self) -> Result<Self> {
        if self.env == Environment::Test {
            self.database.url = match &self.database.test_database_url {
                Some(url) => url.clone(),
                None => test_database_url(&self.database.url)?,
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.database.url)
            .map_err(|e| Error::Config(format!("database.url is not a valid URL: {e}")))?;
        url::Url::parse(&self.api.effective_base_url())
            .map_err(|e| Error::Config(format!("api.base_url is not a valid URL: {e}")))?;

        if self.database.pool_min_size > self.database.effective_pool_max_size() {
            return Err(Error::Config(
                "database.pool_min_size exceeds database.pool_max_size".to_string(),
            ));
        }
        if self.search.max_limit > 0 && self.search.default_limit > self.search.max_limit {
            return Err(Error::Config(format!(
                "search.default_limit ({}) exceeds search.max_limit ({})",
                self.search.default_limit, self.search.max_limit
            )));
        }
        if !(0.0..=1.0).contains(&self.logging.trace_sample_ratio) {
            return Err(Error::Config(
                "logging.trace_sample_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !matches!(
            self.logging.file_rotation.as_str(),
            "daily" | "hourly" | "minutely" | "never"
        ) {
            return Err(Error::Config(format!(
                "logging.file_rotation '{}' is not one of daily, hourly, minutely, never",
                self.logging.file_rotation
            )));
        }
        if self.monitor.enabled && self.monitor.interval_seconds == 0 {
            return Err(Error::Config(
                "monitor.interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn environment_source() -> config::Environment {
    config::Environment::with_prefix("NABLA")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn test_database_url(url: &str) -> Result<String> {
    let mut parsed = url::Url::parse(url)
        .map_err(|e| Error::Config(format!("database.url is not a valid URL: {e}")))?;
    let name = parsed.path().trim_start_matches('/').to_string();
    if name.is_empty() || name.ends_with("-test") {
        return Ok(url.to_string());
    }
    parsed.set_path(&format!("/{name}-test"));
    Ok(parsed.to_string())
}
