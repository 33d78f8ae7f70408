//! Database layer
//!
//! SQLite-backed persistence for the engine's own durable state: volume,
//! equalizer configuration, last played track, crossfade duration. All of
//! it lives in a single key-value `settings` table.

pub mod init;
pub mod settings;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Open (creating if necessary) the engine database and initialize its
/// schema and defaults.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map_err(crate::error::Error::Database)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    init::init_schema(&pool).await?;
    init::init_settings_defaults(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests and ephemeral (`--no-audio`) runs.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init::init_schema(&pool).await?;
    init::init_settings_defaults(&pool).await?;
    Ok(pool)
}
