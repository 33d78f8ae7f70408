//! Shared player state
//!
//! The single process-wide state record (the player state store). Created
//! once at engine construction and torn down at exit; every component
//! reads it, but only the engine mutates it; collaborators request
//! mutations through the engine API, which prevents torn reads of the
//! current track during an output-handle swap.

use segue_common::events::{EventBus, PlayerEvent, TransportState};
use segue_common::model::{RepeatMode, Track};
use segue_common::params::EVENT_BUS_CAPACITY;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

/// Serializable point-in-time copy of the player state.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub current_track: Option<Track>,
    pub state: TransportState,
    pub is_playing: bool,
    /// Normalized position in [0, 1].
    pub progress: f64,
    pub duration_secs: f64,
    /// Linear (pre-curve) volume in [0, 1].
    pub volume: f32,
    pub shuffle: bool,
    pub repeat_mode: RepeatMode,
}

/// Shared state accessible by all components.
///
/// RwLock fields for concurrent read access with rare writes.
pub struct SharedState {
    transport: RwLock<TransportState>,
    current_track: RwLock<Option<Track>>,
    progress: RwLock<f64>,
    duration_secs: RwLock<f64>,
    volume: RwLock<f32>,
    shuffle: RwLock<bool>,
    repeat_mode: RwLock<RepeatMode>,
    events: EventBus,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            transport: RwLock::new(TransportState::Idle),
            current_track: RwLock::new(None),
            progress: RwLock::new(0.0),
            duration_secs: RwLock::new(0.0),
            volume: RwLock::new(segue_common::params::DEFAULT_VOLUME),
            shuffle: RwLock::new(false),
            repeat_mode: RwLock::new(RepeatMode::Off),
            events: EventBus::new(EVENT_BUS_CAPACITY),
        }
    }

    /// Broadcast an event to all listeners; no-subscriber sends are fine.
    pub fn broadcast_event(&self, event: PlayerEvent) {
        self.events.emit_lossy(event);
    }

    /// Subscribe to the event stream (SSE, tests, collaborators).
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub async fn transport(&self) -> TransportState {
        *self.transport.read().await
    }

    /// Set the transport state, broadcasting the transition when it is an
    /// actual change.
    pub async fn set_transport(&self, new_state: TransportState) {
        let old_state = {
            let mut guard = self.transport.write().await;
            let old = *guard;
            *guard = new_state;
            old
        };
        if old_state != new_state {
            self.broadcast_event(PlayerEvent::PlaybackStateChanged {
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    pub async fn is_playing(&self) -> bool {
        *self.transport.read().await == TransportState::Playing
    }

    pub async fn current_track(&self) -> Option<Track> {
        self.current_track.read().await.clone()
    }

    pub async fn set_current_track(&self, track: Option<Track>) {
        *self.current_track.write().await = track;
    }

    pub async fn progress(&self) -> f64 {
        *self.progress.read().await
    }

    pub async fn set_progress(&self, progress: f64) {
        *self.progress.write().await = progress.clamp(0.0, 1.0);
    }

    pub async fn duration_secs(&self) -> f64 {
        *self.duration_secs.read().await
    }

    pub async fn set_duration_secs(&self, duration: f64) {
        *self.duration_secs.write().await = duration.max(0.0);
    }

    /// Linear (pre-curve) volume in [0, 1].
    pub async fn volume(&self) -> f32 {
        *self.volume.read().await
    }

    pub async fn set_volume(&self, volume: f32) {
        *self.volume.write().await = volume.clamp(0.0, 1.0);
    }

    pub async fn shuffle(&self) -> bool {
        *self.shuffle.read().await
    }

    pub async fn set_shuffle(&self, shuffle: bool) {
        *self.shuffle.write().await = shuffle;
    }

    pub async fn repeat_mode(&self) -> RepeatMode {
        *self.repeat_mode.read().await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) {
        *self.repeat_mode.write().await = mode;
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        let state = self.transport().await;
        PlaybackSnapshot {
            current_track: self.current_track().await,
            state,
            is_playing: state == TransportState::Playing,
            progress: self.progress().await,
            duration_secs: self.duration_secs().await,
            volume: self.volume().await,
            shuffle: self.shuffle().await,
            repeat_mode: self.repeat_mode().await,
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
