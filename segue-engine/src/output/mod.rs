//! Audio output handles
//!
//! The engine owns exactly two output handles at any time: the primary
//! (audible) one and a secondary one used to preload the next track for a
//! crossfade. `AudioOutput` abstracts one such handle; `device` is the
//! real rodio-backed implementation, `sim` a deterministic clock-driven
//! one for tests and `--no-audio` runs.
//!
//! Handle identity: every successful `load()` mints a fresh [`HandleId`]
//! for the slot. The processing graph can be built at most once per
//! handle id; a second attempt reports [`OutputError::GraphConflict`],
//! which callers treat as "already connected".

pub mod device;
pub mod filter;
pub mod sim;

use segue_common::model::EQ_BAND_COUNT;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub use device::RodioOutput;
pub use sim::SimOutput;

/// Identity of one loaded source on one output slot.
///
/// Stable for the lifetime of a loaded source; a new load on the same
/// slot produces a new id, which is what forces the equalizer graph to be
/// rebuilt rather than reparented after a crossfade swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    pub slot: usize,
    pub generation: u64,
}

/// Notifications emitted by an output handle.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The loaded source is buffered enough to start playing.
    ReadyToPlay { handle: HandleId },
    /// The source played to its natural end.
    Ended { handle: HandleId },
    /// Decode or network failure for the loaded source.
    Error { handle: HandleId, message: String },
}

/// Errors reported by an output handle.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The operation was superseded by a newer one; benign.
    #[error("aborted: {0}")]
    Aborted(String),

    /// Processing graph already built for this handle.
    #[error("processing graph already built")]
    GraphConflict,

    /// No source loaded / device not ready for the operation.
    #[error("output not ready: {0}")]
    NotReady(String),

    /// Source could not be opened or decoded.
    #[error("stream error: {0}")]
    Stream(String),
}

/// One audio output handle (primary or secondary/preload).
///
/// Control methods are synchronous and non-blocking; readiness, natural
/// end, and failures arrive on the event stream. `load` is async because
/// it may set up network streaming before handing the source to the
/// device.
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Arena slot index of this handle (0 or 1).
    fn slot(&self) -> usize;

    /// Identity of the currently loaded source.
    fn handle_id(&self) -> HandleId;

    /// Begin loading `url`. Replaces any previously loaded source and
    /// mints a new handle id. Emits `ReadyToPlay` (or `Error`) later.
    async fn load(&self, url: &str) -> Result<HandleId, OutputError>;

    /// Start or resume playback of the loaded source.
    fn play(&self) -> Result<(), OutputError>;

    /// Pause playback, keeping the source.
    fn pause(&self);

    /// Tear down the loaded source entirely.
    fn stop(&self);

    /// Set the applied (post-curve) gain in [0, 1].
    fn set_gain(&self, gain: f32);

    /// Seek to an absolute position in seconds.
    fn seek(&self, position_secs: f64) -> Result<(), OutputError>;

    /// Current playback position in seconds.
    fn position_secs(&self) -> f64;

    /// Duration of the loaded source, when known.
    fn duration_secs(&self) -> Option<f64>;

    /// Build the processing graph (source -> filter stages -> output) for
    /// the current handle. At most once per handle id.
    fn build_eq_graph(&self, bands: &[f32; EQ_BAND_COUNT]) -> Result<(), OutputError>;

    /// Enable/bypass the filter stages of a built graph.
    fn set_eq_enabled(&self, enabled: bool) -> Result<(), OutputError>;

    /// Set one filter stage's gain on a built graph.
    fn set_eq_band(&self, index: usize, gain_db: f32) -> Result<(), OutputError>;

    /// Subscribe to this handle's device events.
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;
}

/// Shared, dyn-erased output handle.
pub type SharedOutput = Arc<dyn AudioOutput>;
