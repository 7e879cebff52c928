//! nabla db-backup SDK
//!
//! Client for the nabla database-backup service:
//! - Database inventory and backup requests against the remote API
//! - Backup schedules
//! - Paginated text search over locally stored backup records (PostgreSQL)
//! - Connection lifecycle events and an optional diagnostic monitor

#![allow(
    clippy::large_enum_variant, // Error wraps driver errors by value
)]

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod sdk;
pub mod service;
pub mod store;

pub use api::BackupApiClient;
pub use config::Config;
pub use connection::{Connection, ConnectionEvent};
pub use error::{Error, Result};
pub use sdk::MoontowerSdk;
pub use service::{DatabaseInventory, DatabaseStats, NablaDbBackup, ServiceEvent};
