//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).
//! All settings are global; persisted values survive restarts, and a
//! value that fails to parse is treated as missing rather than an error.

use crate::config::normalize_crossfade_secs;
use crate::error::Result;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Get crossfade length in seconds (0-12)
///
/// Invalid or missing persisted values normalize to 0, which disables
/// timed crossfades entirely.
pub async fn get_crossfade_seconds(db: &Pool<Sqlite>) -> Result<f64> {
    let value = get_setting::<f64>(db, "crossfade_seconds").await?;
    Ok(normalize_crossfade_secs(value.unwrap_or(0.0)))
}

/// Set crossfade length in seconds, clamped to 0-12
pub async fn set_crossfade_seconds(db: &Pool<Sqlite>, seconds: f64) -> Result<()> {
    set_setting(db, "crossfade_seconds", normalize_crossfade_secs(seconds)).await
}

/// Get master volume (0-100)
pub async fn get_volume(db: &Pool<Sqlite>) -> Result<u8> {
    match get_setting::<u8>(db, "volume_level").await? {
        Some(volume) => Ok(volume.min(100)),
        None => Ok(100),
    }
}

/// Set master volume, clamped to 0-100
pub async fn set_volume(db: &Pool<Sqlite>, volume: u8) -> Result<()> {
    set_setting(db, "volume_level", volume.min(100)).await
}

/// Get a typed setting value; unparseable stored text reads as None
async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    Ok(row.and_then(|(value,)| value.parse().ok()))
}

/// Upsert a setting value
async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
