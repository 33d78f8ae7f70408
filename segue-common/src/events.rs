//! Event types for the Segue engine
//!
//! The engine uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many notification of UI /
//!   stats / history collaborators
//! - **Shared state** (`Arc<RwLock<T>>`): read-heavy access to the
//!   player state record
//!
//! Events are serializable so the HTTP layer can re-broadcast them over
//! SSE unchanged.

use crate::model::{EqualizerState, Track, TrackId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Transport state of the playback engine.
///
/// `Idle -> Loading -> Ready -> Playing <-> Paused -> Ended`; any state may
/// transition to `Error` on unrecoverable failure, and `Error` transitions
/// back to `Loading` on retry/fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Error,
}

/// Severity attached to user-facing playback errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
}

/// Why the queue changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueChangeTrigger {
    UserAction,
    TrackFinished,
    Autoplay,
    Shuffle,
}

/// Engine event types, broadcast via [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A new track was committed to the current slot.
    ///
    /// Emitted as soon as a load is committed; history/stat collaborators
    /// count plays from this event.
    TrackChanged {
        track: Track,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transport state changed.
    PlaybackStateChanged {
        old_state: TransportState,
        new_state: TransportState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic progress tick (~4 Hz) with normalized position.
    PlaybackProgress {
        track_id: TrackId,
        /// Position in [0, 1].
        progress: f64,
        duration_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User-visible, non-fatal playback failure (toast-equivalent).
    PlaybackError {
        message: String,
        severity: ErrorSeverity,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed.
    QueueChanged {
        upcoming: Vec<TrackId>,
        trigger: QueueChangeTrigger,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User-facing (linear) volume changed.
    VolumeChanged {
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Equalizer configuration changed.
    EqualizerChanged {
        state: EqualizerState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Event type string for SSE event framing.
    pub fn type_str(&self) -> &'static str {
        match self {
            PlayerEvent::TrackChanged { .. } => "TrackChanged",
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::PlaybackProgress { .. } => "PlaybackProgress",
            PlayerEvent::PlaybackError { .. } => "PlaybackError",
            PlayerEvent::QueueChanged { .. } => "QueueChanged",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::EqualizerChanged { .. } => "EqualizerChanged",
        }
    }
}

/// One-to-many event broadcaster.
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; errors when no subscriber is listening.
    pub fn emit(&self, event: PlayerEvent) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case.
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = PlayerEvent::PlaybackStateChanged {
            old_state: TransportState::Paused,
            new_state: TransportState::Playing,
            timestamp: chrono::Utc::now(),
        };

        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        let track = Track::new("yt:x", "Song", "Artist", 200.0, Platform::YouTube);
        bus.emit(PlayerEvent::TrackChanged {
            track: track.clone(),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            PlayerEvent::TrackChanged { track: received, .. } => {
                assert_eq!(received.id, track.id);
            }
            other => panic!("wrong event type received: {:?}", other.type_str()),
        }
    }

    #[test]
    fn test_eventbus_emit_lossy() {
        let bus = EventBus::new(100);
        // Should not panic without subscribers
        bus.emit_lossy(PlayerEvent::VolumeChanged {
            volume: 0.7,
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = PlayerEvent::VolumeChanged {
            volume: 0.5,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"VolumeChanged\""));
    }
}
