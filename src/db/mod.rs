//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for the catalog and for API tokens.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drones (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            title TEXT NOT NULL,
            year INTEGER NOT NULL,
            price INTEGER NOT NULL,
            categories TEXT NOT NULL DEFAULT '[]',
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Full-text index over titles, kept in sync by triggers
    sqlx::query(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS drones_fts USING fts5(
            title,
            content = 'drones',
            content_rowid = 'id'
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS drones_fts_insert AFTER INSERT ON drones BEGIN
            INSERT INTO drones_fts (rowid, title) VALUES (new.id, new.title);
        END;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS drones_fts_delete AFTER DELETE ON drones BEGIN
            INSERT INTO drones_fts (drones_fts, rowid, title) VALUES ('delete', old.id, old.title);
        END;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS drones_fts_update AFTER UPDATE OF title ON drones BEGIN
            INSERT INTO drones_fts (drones_fts, rowid, title) VALUES ('delete', old.id, old.title);
            INSERT INTO drones_fts (rowid, title) VALUES (new.id, new.title);
        END;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tokens (
            hash BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            expiry TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tokens_permissions (
            token_hash BLOB NOT NULL REFERENCES tokens(hash) ON DELETE CASCADE,
            code TEXT NOT NULL,
            PRIMARY KEY (token_hash, code)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common sort columns
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_drones_year ON drones(year);
        CREATE INDEX IF NOT EXISTS idx_drones_price ON drones(price);
        CREATE INDEX IF NOT EXISTS idx_drones_title ON drones(title);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
