//! CLI command definitions and dispatch.

pub mod jobs;
pub mod migrate;

use clap::{Parser, Subcommand};

use crate::output::{self, OutputFormat};
use helpdesk_cache::CacheManager;
use helpdesk_core::config::AppConfig;
use helpdesk_core::error::AppError;
use helpdesk_database::DatabasePool;
use helpdesk_worker::{InstanceId, LockManager};

/// Helpdesk background job administration
#[derive(Debug, Parser)]
#[command(name = "helpdesk-cli", version, about, long_about = None)]
pub struct Cli {
    /// Base configuration file, without extension
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Environment overlay, read from `<env>` beside the base file
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Job history, locks, and retention
    Jobs(jobs::JobsArgs),
    /// Database migration management
    Migrate(migrate::MigrateArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = AppConfig::load_from(&self.config, &self.env)?;
        match &self.command {
            Commands::Jobs(args) => jobs::execute(args, &config, self.format).await,
            Commands::Migrate(args) => migrate::execute(args, &config, self.format).await,
        }
    }
}

/// Connect to the database without touching the schema
pub async fn connect_db(config: &AppConfig) -> Result<DatabasePool, AppError> {
    let mut db_config = config.database.clone();
    db_config.run_migrations = false;
    DatabasePool::connect(&db_config).await
}

/// Lock manager acting as this CLI process
pub async fn connect_locks(config: &AppConfig) -> Result<LockManager, AppError> {
    if config.cache.provider == "memory" {
        output::print_warning(
            "Lock store is in-memory; locks held by running servers are not visible here.",
        );
    }
    let cache = CacheManager::new(&config.cache).await?;
    Ok(LockManager::new(cache.provider(), InstanceId::current())
        .with_ttl(config.scheduler.lock_ttl()))
}
