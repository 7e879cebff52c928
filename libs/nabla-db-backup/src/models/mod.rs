//! Domain models for backup records, users and schedules

pub mod backup;
pub mod schedule;
pub mod user;

pub use backup::{Backup, BackupQuery, BackupStatus, NewBackup, Reference, BACKUP_SCHEMA};
pub use schedule::{BackupSchedule, Interval, NewSchedule, SchedulePatch};
pub use user::{User, USER_SCHEMA};

use nabla_query::SchemaRegistry;

/// Schemas of every collection the SDK stores.
pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new().with(&BACKUP_SCHEMA).with(&USER_SCHEMA)
}
