//! Settings access
//!
//! Read/write the engine's persisted state from the settings table
//! (key-value store). Structured values (equalizer, last track) are
//! stored as JSON.

use crate::error::{Error, Result};
use segue_common::model::{EqualizerState, Track};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Get volume setting (0.0-1.0).
pub async fn get_volume(db: &SqlitePool) -> Result<f32> {
    match get_setting::<f32>(db, "volume_level").await? {
        Some(vol) => Ok(vol.clamp(0.0, 1.0)),
        None => {
            set_volume(db, segue_common::params::DEFAULT_VOLUME).await?;
            Ok(segue_common::params::DEFAULT_VOLUME)
        }
    }
}

/// Set volume setting (0.0-1.0).
pub async fn set_volume(db: &SqlitePool, volume: f32) -> Result<()> {
    set_setting(db, "volume_level", volume.clamp(0.0, 1.0)).await
}

/// Get crossfade duration in seconds (0 disables crossfading).
pub async fn get_crossfade_seconds(db: &SqlitePool) -> Result<f64> {
    match get_setting::<f64>(db, "crossfade_seconds").await? {
        Some(secs) => Ok(secs.max(0.0)),
        None => {
            set_crossfade_seconds(db, segue_common::params::DEFAULT_CROSSFADE_SECS).await?;
            Ok(segue_common::params::DEFAULT_CROSSFADE_SECS)
        }
    }
}

/// Set crossfade duration in seconds.
pub async fn set_crossfade_seconds(db: &SqlitePool, seconds: f64) -> Result<()> {
    set_setting(db, "crossfade_seconds", seconds.max(0.0)).await
}

/// Get persisted equalizer configuration.
pub async fn get_equalizer(db: &SqlitePool) -> Result<EqualizerState> {
    match get_setting::<String>(db, "equalizer").await? {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("Invalid equalizer JSON: {e}"))),
        None => Ok(EqualizerState::default()),
    }
}

/// Persist equalizer configuration.
pub async fn set_equalizer(db: &SqlitePool, state: &EqualizerState) -> Result<()> {
    let json = serde_json::to_string(state)
        .map_err(|e| Error::Internal(format!("equalizer serialization: {e}")))?;
    set_setting(db, "equalizer", json).await
}

/// Get the last played track, if one was persisted.
pub async fn get_last_track(db: &SqlitePool) -> Result<Option<Track>> {
    match get_setting::<String>(db, "last_track").await? {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid last_track JSON: {e}"))),
        None => Ok(None),
    }
}

/// Persist the last played track.
pub async fn set_last_track(db: &SqlitePool, track: &Track) -> Result<()> {
    let json = serde_json::to_string(track)
        .map_err(|e| Error::Internal(format!("track serialization: {e}")))?;
    set_setting(db, "last_track", json).await
}

/// Generic setting getter.
///
/// Returns None when the key is absent; parse failures are config errors.
pub async fn get_setting<T: FromStr>(db: &SqlitePool, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter. Inserts or updates.
pub async fn set_setting<T: ToString>(db: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use segue_common::model::Platform;

    #[tokio::test]
    async fn test_volume_round_trip_and_clamp() {
        let pool = open_in_memory().await.unwrap();
        set_volume(&pool, 0.8).await.unwrap();
        assert_eq!(get_volume(&pool).await.unwrap(), 0.8);

        set_volume(&pool, 1.7).await.unwrap();
        assert_eq!(get_volume(&pool).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_crossfade_seconds_round_trip() {
        let pool = open_in_memory().await.unwrap();
        set_crossfade_seconds(&pool, 8.5).await.unwrap();
        assert_eq!(get_crossfade_seconds(&pool).await.unwrap(), 8.5);

        // Negative values are pinned at zero (disabled)
        set_crossfade_seconds(&pool, -2.0).await.unwrap();
        assert_eq!(get_crossfade_seconds(&pool).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_equalizer_round_trip() {
        let pool = open_in_memory().await.unwrap();
        // Defaults exist from init
        let initial = get_equalizer(&pool).await.unwrap();
        assert_eq!(initial, EqualizerState::default());

        let mut state = EqualizerState::default();
        state.enabled = true;
        state.set_band(4, -7.0);
        set_equalizer(&pool, &state).await.unwrap();
        assert_eq!(get_equalizer(&pool).await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_last_track_round_trip() {
        let pool = open_in_memory().await.unwrap();
        assert!(get_last_track(&pool).await.unwrap().is_none());

        let track = Track::new("bc:55", "Song", "Artist", 210.0, Platform::Bandcamp)
            .with_stream_url("https://cdn.example.com/55.mp3");
        set_last_track(&pool, &track).await.unwrap();
        let restored = get_last_track(&pool).await.unwrap().unwrap();
        assert_eq!(restored, track);
    }

    #[tokio::test]
    async fn test_get_setting_missing_key() {
        let pool = open_in_memory().await.unwrap();
        let missing: Option<i64> = get_setting(&pool, "no_such_key").await.unwrap();
        assert!(missing.is_none());
    }
}
