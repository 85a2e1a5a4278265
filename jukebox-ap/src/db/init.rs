//! Database initialization
//!
//! Creates the settings table and seeds default values on first run.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Open (creating if missing) the SQLite database at `path`
pub async fn open_database(path: &Path) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    init_settings_defaults(&pool).await?;

    Ok(pool)
}

/// Create tables if they do not exist
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize settings table with default values
pub async fn init_settings_defaults(pool: &Pool<Sqlite>) -> Result<()> {
    // Settings with their default values
    let defaults = vec![
        // Crossfade disabled by default; 0 means pure gapless/ended mode
        ("crossfade_seconds", "0"),
        // Master volume (0-100)
        ("volume_level", "100"),
    ];

    for (key, default_value) in defaults {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
                .bind(key)
                .fetch_one(pool)
                .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
    }

    Ok(())
}
