//! Embedded schema migrations.

use std::collections::HashSet;

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

use helpdesk_core::error::{AppError, ErrorKind};
use helpdesk_core::result::AppResult;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Postgres `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// One embedded migration and whether the database has applied it.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub applied: bool,
}

/// Apply every pending migration.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR.run(pool).await.map_err(|e| {
        AppError::with_source(ErrorKind::Database, "Failed to run migrations", e)
    })?;
    info!(count = MIGRATOR.iter().count(), "Database migrations applied");
    Ok(())
}

/// List embedded migrations with their applied state.
pub async fn migration_status(pool: &PgPool) -> AppResult<Vec<MigrationStatus>> {
    let applied = applied_versions(
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success")
            .fetch_all(pool)
            .await,
    )?;

    Ok(MIGRATOR
        .iter()
        .map(|m| MigrationStatus {
            version: m.version,
            description: m.description.to_string(),
            applied: applied.contains(&m.version),
        })
        .collect())
}

/// The bookkeeping table does not exist until the first run; that alone
/// means nothing is applied. Any other failure is reported.
fn applied_versions(rows: Result<Vec<i64>, sqlx::Error>) -> AppResult<HashSet<i64>> {
    match rows {
        Ok(versions) => Ok(versions.into_iter().collect()),
        Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNDEFINED_TABLE) => {
            Ok(HashSet::new())
        }
        Err(e) => Err(AppError::with_source(
            ErrorKind::Database,
            "Failed to read applied migrations",
            e,
        )),
    }
}
