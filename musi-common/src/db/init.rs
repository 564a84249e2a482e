//! Database initialization
//!
//! Creates the database file and schema on first run. Every statement is
//! idempotent, so startup can run it against an existing database.

use super::models::Platform;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

/// Open (creating if needed) the database and bring its schema up to date
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database with the full schema
///
/// Limited to one connection: every SQLite memory connection is its own
/// database.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create tables and seed the platform registry
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_platforms_table(pool).await?;
    create_artists_table(pool).await?;
    create_tracks_table(pool).await?;
    seed_platforms(pool).await?;

    debug!("Database schema ready");
    Ok(())
}

async fn create_platforms_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS platforms (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            url TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_artists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            name TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            url TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            artist TEXT NOT NULL REFERENCES artists(name),
            duration_secs INTEGER NOT NULL DEFAULT 0,
            stream_url TEXT NOT NULL,
            platform_id INTEGER REFERENCES platforms(id),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn seed_platforms(pool: &SqlitePool) -> Result<()> {
    for platform in Platform::ALL {
        sqlx::query("INSERT OR IGNORE INTO platforms (id, name, url) VALUES (?, ?, ?)")
            .bind(platform.id())
            .bind(platform.name())
            .bind(platform.home_url())
            .execute(pool)
            .await?;
    }
    Ok(())
}
