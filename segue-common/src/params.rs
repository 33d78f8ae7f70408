//! Engine tuning parameters
//!
//! Central definition of the engine's tunable constants. Values the user
//! can change at runtime (volume, crossfade duration, equalizer) live in
//! the settings table instead; everything here is a built-in default.

use std::time::Duration;

/// Number of discrete volume steps in a crossfade ramp.
pub const CROSSFADE_STEPS: u32 = 50;

/// How long to wait for the preloaded track to report ready before the
/// crossfade is abandoned and playback continues to natural end.
pub const CROSSFADE_PRELOAD_TIMEOUT: Duration = Duration::from_secs(3);

/// Default crossfade duration in seconds; 0 disables crossfading.
pub const DEFAULT_CROSSFADE_SECS: f64 = 6.0;

/// Default linear volume on first run.
pub const DEFAULT_VOLUME: f32 = 0.5;

/// Play-history ring capacity; oldest entries are dropped beyond this.
pub const HISTORY_CAPACITY: usize = 50;

/// Interval between device position polls (~4 Hz).
pub const POSITION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Fraction of the track below which `previous` restarts the current
/// track instead of going back through history.
pub const PREVIOUS_RESTART_WINDOW: f64 = 0.05;

/// Maximum candidate tracks tried by a single `next` operation before
/// playback stops.
pub const NEXT_TRACK_MAX_ATTEMPTS: u32 = 5;

/// Continuity search: queries executed concurrently in the first wave.
pub const CONTINUITY_PARALLEL_QUERIES: usize = 2;

/// Continuity search: additional sequential queries when the first wave
/// comes up short.
pub const CONTINUITY_EXTRA_QUERIES: usize = 2;

/// Continuity search: result count below which extra queries run.
pub const CONTINUITY_MIN_RESULTS: usize = 10;

/// Continuity search: maximum tracks appended to the queue per refill.
pub const CONTINUITY_MAX_APPEND: usize = 15;

/// Continuity search: candidates at or below this duration are discarded
/// (jingles, previews, shorts).
pub const CONTINUITY_MIN_DURATION_SECS: f64 = 60.0;

/// Continuity search: distinct recent-history artists considered for the
/// quaternary queries.
pub const CONTINUITY_HISTORY_ARTISTS: usize = 3;

/// Title keywords that mark a track as a remix/edit variant.
pub const REMIX_INDICATORS: [&str; 6] = ["remix", "mix", "edit", "bootleg", "vip", "flip"];

/// Words excluded when deriving search queries from a track title.
pub const TITLE_STOPLIST: [&str; 10] = [
    "feat", "remix", "official", "audio", "video", "music", "original", "extended", "radio",
    "edit",
];

/// Minimum significant-word length for title-derived queries.
pub const TITLE_MIN_WORD_LEN: usize = 3;

/// Event bus buffer depth.
pub const EVENT_BUS_CAPACITY: usize = 100;
