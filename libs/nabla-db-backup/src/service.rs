//! Database backup service
//!
//! Owns the database connection (opened on demand), the local backup-record
//! store and the remote API client. Every failure is returned to the caller
//! and also published as [`ServiceEvent::NablaError`] for subscribers.

use crate::api::BackupApiClient;
use crate::config::{ApiConfig, Config};
use crate::connection::Connection;
use crate::metrics::{
    SEARCH_DURATION_SECONDS, SEARCH_RESULTS, SEARCH_TOTAL, SERVICE_ERRORS_TOTAL,
};
use crate::models::{
    self, Backup, BackupQuery, BackupSchedule, NewBackup, NewSchedule, SchedulePatch,
    BACKUP_SCHEMA,
};
use crate::monitor::ConnectionMonitor;
use crate::store::{PgCollection, PgDocumentStore};
use crate::{Error, Result};
use nabla_query::{PageResult, Paginator, RawQueryOptions};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, OnceCell};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    NablaError(String),
}

/// Size figures of one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub db: String,
    /// Bytes on disk
    pub data_size: u64,
    /// Live rows across user tables
    pub objects: u64,
    /// User tables
    pub collections: u64,
}

/// What a backup request reports about the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInventory {
    /// Every database except `postgres` and templates
    pub databases: Vec<String>,
    pub stats: DatabaseStats,
    /// Estimated rows of the `users` table, 0 without one
    pub user_count: u64,
}

impl DatabaseInventory {
    pub fn backup_request(&self, api: &ApiConfig) -> NewBackup {
        NewBackup {
            db: self.stats.db.clone(),
            file: None,
            user: None,
            ip: api.client_ip.clone(),
            user_count: self.user_count,
            db_size: self.stats.data_size,
            record_count: self.stats.objects,
            collection_count: self.stats.collections,
            hostname: api.hostname.clone(),
            sitename: api.sitename.clone(),
        }
    }
}

struct Backend {
    connection: Connection,
    store: PgDocumentStore,
    _monitor: Option<ConnectionMonitor>,
}

pub struct NablaDbBackup {
    config: Config,
    api: BackupApiClient,
    backend: OnceCell<Backend>,
    events: broadcast::Sender<ServiceEvent>,
}

impl NablaDbBackup {
    /// Build the service. Nothing connects until [`connect`](Self::connect).
    pub fn new(config: Config) -> Result<Self> {
        let api = BackupApiClient::new(&config.api)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            config,
            api,
            backend: OnceCell::new(),
            events,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &BackupApiClient {
        &self.api
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    /// Open the connection (once), run migrations and start the monitor
    /// when configured.
    pub async fn connect(&self) -> Result<&Connection> {
        let result = self
            .backend
            .get_or_try_init(|| self.open_backend())
            .await
            .map(|backend| &backend.connection);
        self.report(result)
    }

    async fn open_backend(&self) -> Result<Backend> {
        let connection = Connection::connect(&self.config.database).await?;
        let store = PgDocumentStore::new(connection.pool().clone(), models::registry());
        if self.config.database.run_migrations {
            store.migrate().await?;
        }
        let monitor = self.config.monitor.enabled.then(|| {
            ConnectionMonitor::start(
                connection.clone(),
                Duration::from_secs(self.config.monitor.interval_seconds),
            )
        });
        Ok(Backend {
            connection,
            store,
            _monitor: monitor,
        })
    }

    fn backend(&self) -> Result<&Backend> {
        self.backend.get().ok_or(Error::NotConnected)
    }

    pub fn connection(&self) -> Result<&Connection> {
        self.backend().map(|backend| &backend.connection)
    }

    pub fn store(&self) -> Result<&PgDocumentStore> {
        self.backend().map(|backend| &backend.store)
    }

    pub fn db_name(&self) -> Result<&str> {
        self.connection().map(Connection::database_name)
    }

    /// Handle on another database of the connected server.
    pub async fn use_db(&self, database: &str) -> Result<Connection> {
        let result = match self.connection() {
            Ok(connection) => connection.use_database(database).await,
            Err(e) => Err(e),
        };
        self.report(result)
    }

    /// Inventory of the connected database.
    pub async fn get_databases(&self) -> Result<DatabaseInventory> {
        let result = match self.connection() {
            Ok(connection) => inventory(connection).await,
            Err(e) => Err(e),
        };
        self.report(result)
    }

    /// Gather the inventory of `database` and send a backup request for it.
    pub async fn create_backup(&self, database: &str) -> Result<Backup> {
        let result: Result<Backup> = async {
            let connection = self.connection()?.use_database(database).await?;
            let gathered = inventory(&connection).await;
            if connection.database_name() != self.db_name()? {
                connection.close().await;
            }
            let request = gathered?.backup_request(&self.config.api);
            tracing::info!(
                db = %request.db,
                db_size = request.db_size,
                records = request.record_count,
                "Sending backup request"
            );
            self.api.create_backup(&request).await
        }
        .await;
        self.report(result)
    }

    /// Local backup records, searchable over `ip`, `file` and `db`.
    pub fn backups(&self) -> Result<Paginator<PgCollection>> {
        let store = self.store()?;
        Ok(Paginator::new(store.collection(&BACKUP_SCHEMA))
            .with_policy(self.config.search.policy())
            .with_filter_builder(self.config.search.filter_builder()))
    }

    #[tracing::instrument(skip(self, options), fields(collection = BACKUP_SCHEMA.collection))]
    pub async fn search_backups(
        &self,
        search: Option<&str>,
        options: &RawQueryOptions,
    ) -> Result<PageResult<Backup>> {
        let started = Instant::now();
        let result: Result<PageResult<Backup>> = async {
            let page = self.backups()?.search(search, options).await?;
            Ok(page.try_map(serde_json::from_value)?)
        }
        .await;

        let collection = BACKUP_SCHEMA.collection;
        SEARCH_DURATION_SECONDS
            .with_label_values(&[collection])
            .observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(page) => {
                SEARCH_TOTAL.with_label_values(&[collection, "ok"]).inc();
                SEARCH_RESULTS
                    .with_label_values(&[collection])
                    .observe(page.results.len() as f64);
            }
            Err(_) => SEARCH_TOTAL.with_label_values(&[collection, "error"]).inc(),
        }
        self.report(result)
    }

    /// Backup records as listed by the remote service.
    pub async fn query_remote_backups(&self, query: &BackupQuery) -> Result<PageResult<Backup>> {
        let result = self.api.query_backups(query).await;
        self.report(result)
    }

    pub async fn list_schedules(&self) -> Result<Vec<BackupSchedule>> {
        let result = self.api.list_schedules().await;
        self.report(result)
    }

    pub async fn create_schedule(&self, schedule: &NewSchedule) -> Result<BackupSchedule> {
        let result = self.api.create_schedule(schedule).await;
        self.report(result)
    }

    pub async fn update_schedule(&self, id: &str, patch: &SchedulePatch) -> Result<BackupSchedule> {
        let result = self.api.update_schedule(id, patch).await;
        self.report(result)
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<()> {
        let result = self.api.delete_schedule(id).await;
        self.report(result)
    }

    pub async fn close(&self) {
        if let Some(backend) = self.backend.get() {
            backend.connection.close().await;
        }
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            SERVICE_ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
            tracing::warn!(kind = err.kind(), error = %err, "Backup service error");
            // No subscribers is fine
            let _ = self.events.send(ServiceEvent::NablaError(err.to_string()));
        }
        result
    }
}

async fn inventory(connection: &Connection) -> Result<DatabaseInventory> {
    let pool = connection.pool();

    let databases: Vec<String> = sqlx::query_scalar(
        "SELECT datname FROM pg_database \
         WHERE NOT datistemplate AND datname <> 'postgres' ORDER BY datname",
    )
    .fetch_all(pool)
    .await?;

    let (db, data_size, objects, collections): (String, i64, i64, i64) = sqlx::query_as(
        "SELECT current_database(), \
         pg_database_size(current_database()), \
         COALESCE((SELECT SUM(n_live_tup) FROM pg_stat_user_tables), 0)::BIGINT, \
         (SELECT COUNT(*) FROM pg_stat_user_tables)",
    )
    .fetch_one(pool)
    .await?;

    let user_count: Option<i64> = sqlx::query_scalar(
        "SELECT GREATEST(c.reltuples, 0)::BIGINT FROM pg_class c \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relname = 'users' AND c.relkind IN ('r', 'p') \
         AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    if user_count.is_none() {
        tracing::warn!(db = %db, "No users table found");
    }

    Ok(DatabaseInventory {
        databases,
        stats: DatabaseStats {
            db,
            data_size: non_negative(data_size),
            objects: non_negative(objects),
            collections: non_negative(collections),
        },
        user_count: user_count.map_or(0, non_negative),
    })
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
