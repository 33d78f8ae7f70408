//! Track model and player value types
//!
//! Tracks are immutable values: once resolved they are never mutated in
//! place. Updates produce a new `Track` that replaces references held by
//! the queue, history, and current-track slots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of equalizer bands.
pub const EQ_BAND_COUNT: usize = 10;

/// Equalizer band center frequencies in Hz.
pub const EQ_BAND_FREQUENCIES: [f32; EQ_BAND_COUNT] = [
    31.0, 62.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Band gain limits in dB.
pub const EQ_GAIN_MIN: f32 = -12.0;
pub const EQ_GAIN_MAX: f32 = 12.0;

/// Opaque, platform-prefixed track identifier (e.g. `"sc:318742"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Platform-local portion of the id (the part after the platform
    /// prefix), used to key alternate-stream lookups. Ids without a prefix
    /// are returned whole.
    pub fn source_id(&self) -> &str {
        match self.0.split_once(':') {
            Some((_, rest)) if !rest.is_empty() => rest,
            _ => &self.0,
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source platform tag for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    SoundCloud,
    Bandcamp,
    Jamendo,
    Local,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::SoundCloud => "soundcloud",
            Platform::Bandcamp => "bandcamp",
            Platform::Jamendo => "jamendo",
            Platform::Local => "local",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single playable track.
///
/// `stream_url` and `artwork_url` are `None` until a resolver/lookup
/// collaborator fills them in; filling them in produces a new value via
/// [`Track::with_stream_url`] / [`Track::with_artwork_url`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    /// Duration in seconds, normalized at construction.
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
    pub platform: Platform,
}

impl Track {
    /// Create a track, normalizing the raw duration once at the boundary.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        raw_duration: f64,
        platform: Platform,
    ) -> Self {
        Self {
            id: TrackId::new(id),
            title: title.into(),
            artist: artist.into(),
            duration_secs: normalize_duration_secs(raw_duration),
            stream_url: None,
            artwork_url: None,
            platform,
        }
    }

    /// Return a new track with the stream URL set.
    pub fn with_stream_url(&self, url: impl Into<String>) -> Self {
        let mut t = self.clone();
        t.stream_url = Some(url.into());
        t
    }

    /// Return a new track with the artwork URL set.
    pub fn with_artwork_url(&self, url: impl Into<String>) -> Self {
        let mut t = self.clone();
        t.artwork_url = Some(url.into());
        t
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} [{}]", self.artist, self.title, self.id)
    }
}

/// Normalize a raw duration to seconds.
///
/// Upstream platforms report durations in either seconds or milliseconds;
/// values above 1000 are assumed to be milliseconds. Applied exactly once,
/// in the `Track` constructor.
pub fn normalize_duration_secs(raw: f64) -> f64 {
    if raw > 1000.0 {
        raw / 1000.0
    } else {
        raw
    }
}

/// Queue repeat mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    /// Cycle Off -> All -> One -> Off.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

/// Persisted equalizer configuration.
///
/// `bands` always holds exactly [`EQ_BAND_COUNT`] gains in dB, clamped to
/// `[EQ_GAIN_MIN, EQ_GAIN_MAX]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizerState {
    pub enabled: bool,
    pub bands: [f32; EQ_BAND_COUNT],
}

impl Default for EqualizerState {
    fn default() -> Self {
        Self {
            enabled: false,
            bands: [0.0; EQ_BAND_COUNT],
        }
    }
}

impl EqualizerState {
    /// Clamp a band gain to the valid dB range. Out-of-range gains are
    /// clamped, not rejected.
    pub fn clamp_gain(gain: f32) -> f32 {
        gain.clamp(EQ_GAIN_MIN, EQ_GAIN_MAX)
    }

    /// Set one band, clamping the gain.
    pub fn set_band(&mut self, index: usize, gain: f32) {
        if index < EQ_BAND_COUNT {
            self.bands[index] = Self::clamp_gain(gain);
        }
    }

    /// Replace all bands, clamping each gain.
    pub fn apply_preset(&mut self, bands: [f32; EQ_BAND_COUNT]) {
        for (slot, gain) in self.bands.iter_mut().zip(bands) {
            *slot = Self::clamp_gain(gain);
        }
    }
}
