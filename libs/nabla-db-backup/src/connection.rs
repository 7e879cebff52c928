//! Database connection handle
//!
//! An explicitly owned pool plus a lifecycle event channel. Observers (the
//! monitor, the service, callers) subscribe to [`ConnectionEvent`]s instead
//! of hooking a process-wide driver object.

use crate::config::DatabaseConfig;
use crate::{Error, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

const STATE_PENDING: u8 = 0;
const STATE_UP: u8 = 1;
const STATE_DOWN: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Reconnected,
    Error(String),
    Closed,
}

impl std::fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionEvent::Connected => write!(f, "connected"),
            ConnectionEvent::Disconnected => write!(f, "disconnected"),
            ConnectionEvent::Reconnected => write!(f, "reconnected"),
            ConnectionEvent::Error(message) => write!(f, "error: {message}"),
            ConnectionEvent::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Clone)]
pub struct Connection {
    pool: PgPool,
    config: DatabaseConfig,
    database: String,
    events: broadcast::Sender<ConnectionEvent>,
    state: Arc<AtomicU8>,
}

impl Connection {
    /// Open the pool and verify it with one round trip.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = connect_options(config)?;
        let database = options.get_database().unwrap_or_default().to_string();

        let pool = pool_options(config).connect_with(options).await?;

        let conn = Self::from_parts(pool, config, database, STATE_UP);
        tracing::info!(
            database = %conn.database,
            max_connections = config.effective_pool_max_size(),
            "Connected to database"
        );
        conn.emit(ConnectionEvent::Connected);
        Ok(conn)
    }

    /// Pool that opens connections on first use; nothing is verified yet.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let options = connect_options(config)?;
        let database = options.get_database().unwrap_or_default().to_string();
        let pool = pool_options(config).connect_lazy_with(options);
        Ok(Self::from_parts(pool, config, database, STATE_PENDING))
    }

    fn from_parts(pool: PgPool, config: &DatabaseConfig, database: String, state: u8) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pool,
            config: config.clone(),
            database,
            events,
            state: Arc::new(AtomicU8::new(state)),
        }
    }

    /// A second handle on `database` of the same server, with the same
    /// pool settings.
    pub async fn use_database(&self, database: &str) -> Result<Connection> {
        if database == self.database {
            return Ok(self.clone());
        }
        let mut url = url::Url::parse(&self.config.url)
            .map_err(|e| Error::Config(format!("database.url is not a valid URL: {e}")))?;
        url.set_path(&format!("/{database}"));
        let config = DatabaseConfig {
            url: url.to_string(),
            ..self.config.clone()
        };
        Connection::connect(&config).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn is_healthy(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_UP && !self.pool.is_closed()
    }

    /// One round trip. Health transitions are published as events.
    pub async fn ping(&self) -> Result<()> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                let previous = self.state.swap(STATE_UP, Ordering::SeqCst);
                match previous {
                    STATE_PENDING => self.emit(ConnectionEvent::Connected),
                    STATE_DOWN => {
                        tracing::info!(database = %self.database, "Database reconnected");
                        self.emit(ConnectionEvent::Reconnected);
                    }
                    _ => {}
                }
                Ok(())
            }
            Err(e) => {
                self.emit(ConnectionEvent::Error(e.to_string()));
                let previous = self.state.swap(STATE_DOWN, Ordering::SeqCst);
                if previous == STATE_UP {
                    tracing::warn!(database = %self.database, error = %e, "Database disconnected");
                    self.emit(ConnectionEvent::Disconnected);
                }
                Err(e.into())
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        self.state.store(STATE_DOWN, Ordering::SeqCst);
        tracing::info!(database = %self.database, "Database connection closed");
        self.emit(ConnectionEvent::Closed);
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(&config.url)?;
    if config.statement_timeout_seconds == 0 {
        return Ok(options);
    }
    Ok(options.options([(
        "statement_timeout",
        format!("{}s", config.statement_timeout_seconds),
    )]))
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.effective_pool_max_size())
        .acquire_timeout(config.pool_timeout())
}
