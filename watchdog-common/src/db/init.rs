//! Database initialization
//!
//! Creates the catalog database on first run and brings the schema up to the
//! current version on every start. All statements are idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current catalog schema version
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the HTTP handlers read while the relay status recorder writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema_version_table(&pool).await?;
    create_streams_table(&pool).await?;
    record_schema_version(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the streams table
///
/// One row per registered stream source. `kind` and `status` carry CHECK
/// constraints so rows written outside this crate still satisfy the enums.
pub async fn create_streams_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS streams (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL CHECK (length(url) > 0),
            name TEXT NOT NULL CHECK (length(name) > 0),
            kind TEXT NOT NULL CHECK (kind IN ('cctv', 'exam', 'college')),
            status TEXT NOT NULL DEFAULT 'inactive'
                CHECK (status IN ('active', 'inactive', 'error')),
            last_active TIMESTAMP,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_streams_created_at ON streams(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn record_schema_version(pool: &SqlitePool) -> Result<()> {
    let result = sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        info!("Database schema at version {}", SCHEMA_VERSION);
    }

    Ok(())
}

/// Highest schema version recorded in the database
pub async fn schema_version(pool: &SqlitePool) -> Result<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}
