//! nabla - operator CLI for the database-backup service
//!
//! Configuration comes from `config.toml` and `NABLA_*` variables (see
//! `nabla_db_backup::config`). Logs go to stderr, results to stdout.
//!
//! Usage:
//!   nabla databases
//!   nabla backup shop
//!   nabla search 10.0.0 --sort-by createdAt:desc --limit 20
//!   nabla export-csv --db shop --output backups.csv
//!   nabla schedules create --db shop --interval week --day 0 --hour 2

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nabla_db_backup::config::Config;
use nabla_db_backup::models::{
    Backup, BackupQuery, BackupSchedule, Interval, NewSchedule, SchedulePatch, BACKUP_SCHEMA,
};
use nabla_db_backup::{logging, monitor, MoontowerSdk, NablaDbBackup};
use nabla_query::{csv_export, PageResult, QueryFilter, RawQueryOptions};
use std::io::Write;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "nabla")]
#[command(about = "Database backup requests, schedules and backup-record search", version)]
struct Cli {
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search backup records
    Search {
        /// Case-insensitive pattern matched against ip, file and db
        search: Option<String>,

        /// Sort keys, e.g. `createdAt:desc,db`
        #[arg(long)]
        sort_by: Option<String>,

        /// Relations to expand, e.g. `user`
        #[arg(long)]
        populate: Option<String>,

        #[arg(long)]
        limit: Option<String>,

        #[arg(long)]
        page: Option<String>,

        /// Query the remote service instead of the local store
        #[arg(long)]
        remote: bool,
    },

    /// Export local backup records as CSV
    ExportCsv {
        #[arg(long)]
        search: Option<String>,

        /// Only records of this database
        #[arg(long)]
        db: Option<String>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },

    /// List databases and the statistics a backup request would report
    Databases,

    /// Request a backup of a database
    Backup {
        db: String,
    },

    /// Manage backup schedules
    Schedules {
        #[command(subcommand)]
        command: ScheduleCommand,
    },

    /// Print connection diagnostics until interrupted
    Monitor {
        /// Seconds between reports
        #[arg(long, default_value_t = 10)]
        interval: u64,

        /// Stop after this many reports
        #[arg(long)]
        count: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleCommand {
    List,
    Create {
        #[arg(long)]
        db: String,

        /// day, week or month
        #[arg(long)]
        interval: Interval,

        /// Day of week for weekly schedules, Sunday = 0
        #[arg(long)]
        day: Option<u8>,

        /// Hour of day, 0-23
        #[arg(long)]
        hour: u8,
    },
    Update {
        id: String,

        #[arg(long)]
        interval: Option<Interval>,

        #[arg(long)]
        day: Option<u8>,

        #[arg(long)]
        hour: Option<u8>,
    },
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _telemetry_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    let sdk = MoontowerSdk::new(config).context("Failed to initialize SDK")?;
    let result = run(&sdk.db_backup, cli).await;
    sdk.db_backup.close().await;

    logging::shutdown_telemetry();
    result
}

async fn run(service: &NablaDbBackup, cli: Cli) -> Result<()> {
    match cli.command {
        Command::Search {
            search,
            sort_by,
            populate,
            limit,
            page,
            remote,
        } => {
            let options = RawQueryOptions {
                sort_by,
                populate,
                limit: limit.map(Into::into),
                page: page.map(Into::into),
            };
            let results = if remote {
                let query = BackupQuery { search, options };
                service.query_remote_backups(&query).await?
            } else {
                service.connect().await?;
                service.search_backups(search.as_deref(), &options).await?
            };
            if cli.json {
                print_json(&results)?;
            } else {
                print_backups(&results);
            }
        }

        Command::ExportCsv { search, db, output } => {
            service.connect().await?;
            let fields = BACKUP_SCHEMA.searchable_fields()?;
            let mut filter = QueryFilter::from_search(
                service
                    .config()
                    .search
                    .filter_builder()
                    .build(search.as_deref(), &fields)?,
            );
            if let Some(db) = db {
                filter = filter.with_equals("db", serde_json::Value::String(db));
            }

            let collection = service.store()?.collection(&BACKUP_SCHEMA);
            let rows = match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    csv_export::export_collection(&collection, filter, file).await?
                }
                None => {
                    let stdout = std::io::stdout();
                    csv_export::export_collection(&collection, filter, stdout.lock()).await?
                }
            };
            tracing::info!(rows, "CSV export complete");
        }

        Command::Databases => {
            service.connect().await?;
            let inventory = service.get_databases().await?;
            if cli.json {
                print_json(&inventory)?;
            } else {
                println!("Connected to {}", inventory.stats.db);
                println!(
                    "  size {} bytes, {} records, {} tables, {} users",
                    inventory.stats.data_size,
                    inventory.stats.objects,
                    inventory.stats.collections,
                    inventory.user_count
                );
                println!("Databases:");
                for name in &inventory.databases {
                    println!("  {name}");
                }
            }
        }

        Command::Backup { db } => {
            service.connect().await?;
            let backup = service
                .create_backup(&db)
                .await
                .with_context(|| format!("Backup request for {db} failed"))?;
            if cli.json {
                print_json(&backup)?;
            } else {
                println!("Backup {} requested for {} ({})", backup.id, backup.db, backup.file);
            }
        }

        Command::Schedules { command } => run_schedules(service, command, cli.json).await?,

        Command::Monitor { interval, count } => {
            let connection = service.connect().await?;
            let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
            let mut reports = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = monitor::snapshot(connection).await?;
                        if cli.json {
                            println!(
                                "{}",
                                serde_json::json!({
                                    "poolSize": stats.pool_size,
                                    "poolIdle": stats.pool_idle,
                                    "serverSessions": stats.server_sessions,
                                    "activeSessions": stats.active_sessions,
                                })
                            );
                        } else {
                            println!(
                                "pool {}/{} idle, {} server sessions ({} active)",
                                stats.pool_idle,
                                stats.pool_size,
                                stats.server_sessions,
                                stats.active_sessions
                            );
                        }
                        reports += 1;
                        if count.is_some_and(|count| reports >= count) {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
    Ok(())
}

async fn run_schedules(service: &NablaDbBackup, command: ScheduleCommand, json: bool) -> Result<()> {
    match command {
        ScheduleCommand::List => {
            let schedules = service.list_schedules().await?;
            if json {
                print_json(&schedules)?;
            } else if schedules.is_empty() {
                println!("No schedules");
            } else {
                for schedule in &schedules {
                    print_schedule(schedule);
                }
            }
        }
        ScheduleCommand::Create {
            db,
            interval,
            day,
            hour,
        } => {
            let schedule = service
                .create_schedule(&NewSchedule {
                    db,
                    interval,
                    day,
                    hour,
                })
                .await?;
            if json {
                print_json(&schedule)?;
            } else {
                print_schedule(&schedule);
            }
        }
        ScheduleCommand::Update {
            id,
            interval,
            day,
            hour,
        } => {
            let schedule = service
                .update_schedule(&id, &SchedulePatch { interval, day, hour })
                .await?;
            if json {
                print_json(&schedule)?;
            } else {
                print_schedule(&schedule);
            }
        }
        ScheduleCommand::Delete { id } => {
            service.delete_schedule(&id).await?;
            println!("Deleted schedule {id}");
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn print_backups(page: &PageResult<Backup>) {
    for backup in &page.results {
        let created = backup
            .created_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let status = backup.status.map(|s| s.as_str()).unwrap_or("-");
        println!(
            "{:<26} {:<20} {:<16} {:<10} {:<32} {}",
            backup.id, backup.db, backup.ip, status, backup.file, created
        );
    }
    println!(
        "page {}/{} ({} results)",
        page.page, page.total_pages, page.total_results
    );
}

fn print_schedule(schedule: &BackupSchedule) {
    let day = schedule
        .day
        .map(|d| format!(" day {d}"))
        .unwrap_or_default();
    println!(
        "{}  {}  every {}{} at {:02}:00",
        schedule.id,
        schedule.db,
        schedule.interval.as_str(),
        day,
        schedule.hour
    );
}
