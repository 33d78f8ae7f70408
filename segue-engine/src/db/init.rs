//! Database initialization
//!
//! Creates the settings table and fills in defaults for keys that are
//! missing, so the rest of the engine can assume every key parses.

use crate::error::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Create tables if they do not exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
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

/// Initialize settings with default values where missing.
pub async fn init_settings_defaults(pool: &SqlitePool) -> Result<()> {
    let defaults = vec![
        // Linear (pre-curve) volume
        (
            "volume_level",
            segue_common::params::DEFAULT_VOLUME.to_string(),
        ),
        // Crossfade duration in seconds; 0 disables
        (
            "crossfade_seconds",
            segue_common::params::DEFAULT_CROSSFADE_SECS.to_string(),
        ),
        // Equalizer: disabled, flat
        (
            "equalizer",
            serde_json::to_string(&segue_common::model::EqualizerState::default())
                .expect("default equalizer state serializes"),
        ),
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
                .bind(&default_value)
                .execute(pool)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
    }

    Ok(())
}
