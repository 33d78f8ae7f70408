//! Core playback engine - lifecycle and orchestration
//!
//! Owns the two output handles (primary + secondary/preload), the shared
//! player state, and the background tasks that drive everything: the
//! device event loop (ready / ended / error) and the position poll that
//! also arms crossfades. Only the engine mutates the output slots or the
//! player state; collaborators go through the engine API.

use crate::continuity::QueueContinuityManager;
use crate::db;
use crate::engine::crossfade::CrossfadeSession;
use crate::equalizer::EqualizerGraph;
use crate::error::Result;
use crate::output::{AudioOutput, DeviceEvent, SharedOutput};
use crate::queue::PlayQueue;
use crate::resolver::{StreamProvider, StreamResolver};
use crate::state::SharedState;
use segue_common::curves::applied_volume;
use segue_common::events::TransportState;
use segue_common::model::{RepeatMode, Track};
use segue_common::params::POSITION_POLL_INTERVAL;
use sqlx::SqlitePool;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Tracks one in-flight `load` request. A newer load bumps the engine's
/// generation counter; stages of an older load check it and discard their
/// results.
#[derive(Debug, Clone)]
pub(super) struct LoadTicket {
    pub generation: u64,
    pub track: Track,
    pub auto_play: bool,
    /// Set once the device-failure fallback retry has been spent for this
    /// load; prevents infinite recursion when the fallback stream is also
    /// bad.
    pub tried_fallback: bool,
}

/// Playback engine - orchestrates resolution, output handles, queue
/// continuity, and the crossfade sub-state-machine.
///
/// Cheap-clone handle; all clones share one engine instance.
#[derive(Clone)]
pub struct PlayerEngine {
    inner: Arc<EngineInner>,
}

pub struct EngineInner {
    pub(super) db: SqlitePool,
    pub(super) state: Arc<SharedState>,
    pub(super) queue: Arc<RwLock<PlayQueue>>,
    pub(super) resolver: Arc<StreamResolver>,
    pub(super) continuity: Arc<QueueContinuityManager>,
    pub(super) equalizer: Arc<EqualizerGraph>,

    /// The two output handles; `primary_slot` indexes the audible one,
    /// the other is the crossfade preload target. Swapping primaries is
    /// an index swap, never a node transplant.
    pub(super) outputs: [SharedOutput; 2],
    pub(super) primary_slot: AtomicUsize,

    /// Monotonic load counter; see [`LoadTicket`].
    pub(super) load_generation: AtomicU64,
    pub(super) current_load: RwLock<Option<LoadTicket>>,

    /// Serializes play/pause so a pause always waits out a pending play.
    pub(super) transport_lock: Mutex<()>,

    pub(super) crossfade: Mutex<Option<CrossfadeSession>>,
    pub(super) crossfade_seconds: RwLock<f64>,

    /// Last known track, for `play()` on an engine with no loaded source.
    pub(super) last_track: RwLock<Option<Track>>,

    pub(super) running: AtomicBool,
}

impl Deref for PlayerEngine {
    type Target = EngineInner;

    fn deref(&self) -> &EngineInner {
        &self.inner
    }
}

impl PlayerEngine {
    /// Create the engine, restoring persisted state (volume, equalizer,
    /// crossfade duration, last track). The last track is re-armed but
    /// not auto-played.
    pub async fn new(
        db: SqlitePool,
        providers: Vec<Arc<dyn StreamProvider>>,
        outputs: [SharedOutput; 2],
    ) -> Result<Self> {
        info!("Creating playback engine");

        let volume = db::settings::get_volume(&db).await?;
        let crossfade_seconds = db::settings::get_crossfade_seconds(&db).await?;
        let eq_state = db::settings::get_equalizer(&db).await?;
        let last_track = db::settings::get_last_track(&db).await?;

        let state = Arc::new(SharedState::new());
        state.set_volume(volume).await;
        if let Some(track) = &last_track {
            state.set_current_track(Some(track.clone())).await;
            state.set_duration_secs(track.duration_secs).await;
        }

        let resolver = Arc::new(StreamResolver::new(providers.clone()));
        let continuity = Arc::new(QueueContinuityManager::new(providers));
        let equalizer = Arc::new(EqualizerGraph::new(db.clone(), eq_state));

        Ok(Self {
            inner: Arc::new(EngineInner {
                db,
                state,
                queue: Arc::new(RwLock::new(PlayQueue::new())),
                resolver,
                continuity,
                equalizer,
                outputs,
                primary_slot: AtomicUsize::new(0),
                load_generation: AtomicU64::new(0),
                current_load: RwLock::new(None),
                transport_lock: Mutex::new(()),
                crossfade: Mutex::new(None),
                crossfade_seconds: RwLock::new(crossfade_seconds),
                last_track: RwLock::new(last_track),
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Spawn the background tasks. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Starting playback engine tasks");

        let engine = self.clone();
        tokio::spawn(async move { engine.device_event_loop().await });

        let engine = self.clone();
        tokio::spawn(async move { engine.position_poll_loop().await });
    }

    /// Stop background tasks and persist volatile state.
    pub async fn shutdown(&self) {
        info!("Shutting down playback engine");
        self.running.store(false, Ordering::SeqCst);

        let volume = self.state.volume().await;
        if let Err(e) = db::settings::set_volume(&self.db, volume).await {
            warn!("failed to persist volume on shutdown: {e}");
        }
        if let Some(track) = self.last_track.read().await.clone() {
            if let Err(e) = db::settings::set_last_track(&self.db, &track).await {
                warn!("failed to persist last track on shutdown: {e}");
            }
        }
        for output in &self.outputs {
            output.stop();
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn queue_handle(&self) -> &Arc<RwLock<PlayQueue>> {
        &self.queue
    }

    pub async fn crossfade_seconds(&self) -> f64 {
        *self.crossfade_seconds.read().await
    }

    /// Update and persist the crossfade duration (0 disables).
    pub async fn set_crossfade_seconds(&self, seconds: f64) {
        let seconds = seconds.max(0.0);
        *self.crossfade_seconds.write().await = seconds;
        if let Err(e) = db::settings::set_crossfade_seconds(&self.db, seconds).await {
            warn!("failed to persist crossfade duration: {e}");
        }
    }

    /// Index of the currently audible output slot.
    pub fn primary_slot_index(&self) -> usize {
        self.primary_slot.load(Ordering::SeqCst)
    }

    pub(super) fn primary(&self) -> SharedOutput {
        Arc::clone(&self.outputs[self.primary_slot.load(Ordering::SeqCst)])
    }

    pub(super) fn secondary(&self) -> SharedOutput {
        Arc::clone(&self.outputs[1 - self.primary_slot.load(Ordering::SeqCst)])
    }

    /// Swap which slot is primary; returns the retired slot index.
    pub(super) fn swap_primary(&self) -> usize {
        let old = self.primary_slot.load(Ordering::SeqCst);
        self.primary_slot.store(1 - old, Ordering::SeqCst);
        old
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    async fn device_event_loop(&self) {
        let mut rx0 = self.outputs[0].subscribe();
        let mut rx1 = self.outputs[1].subscribe();

        while self.running.load(Ordering::SeqCst) {
            let event = tokio::select! {
                e = rx0.recv() => e,
                e = rx1.recv() => e,
            };
            match event {
                Ok(event) => self.on_device_event(event).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("device event loop lagged by {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("device event loop stopped");
    }

    async fn on_device_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::ReadyToPlay { handle } => {
                let primary = self.primary();
                if handle.slot != primary.slot() || handle != primary.handle_id() {
                    // Preload readiness is awaited by the crossfade task.
                    return;
                }
                let ticket = self.current_load.read().await.clone();
                let Some(ticket) = ticket else { return };
                if self.load_generation.load(Ordering::SeqCst) != ticket.generation {
                    debug!("ready event for superseded load discarded");
                    return;
                }

                let duration = primary
                    .duration_secs()
                    .unwrap_or(ticket.track.duration_secs);
                self.state.set_duration_secs(duration).await;
                self.state.set_progress(0.0).await;

                self.equalizer.activate(primary.as_ref()).await;
                primary.set_gain(applied_volume(self.state.volume().await));

                if ticket.auto_play {
                    self.play().await;
                } else {
                    self.state.set_transport(TransportState::Ready).await;
                }
            }
            DeviceEvent::Ended { handle } => {
                let primary = self.primary();
                if handle.slot != primary.slot() || handle != primary.handle_id() {
                    return;
                }
                if self.crossfade.lock().await.is_some() {
                    // Natural end of the outgoing track during a fade; the
                    // crossfade task completes the transition.
                    return;
                }
                self.on_track_ended().await;
            }
            DeviceEvent::Error { handle, message } => {
                let primary = self.primary();
                if handle.slot != primary.slot() || handle != primary.handle_id() {
                    debug!("error from non-primary handle ignored: {message}");
                    return;
                }
                self.on_device_error(message).await;
            }
        }
    }

    async fn on_track_ended(&self) {
        match self.state.repeat_mode().await {
            RepeatMode::One => {
                // Same track restarts from position 0; history unchanged.
                debug!("repeat-one: restarting current track");
                let primary = self.primary();
                if let Err(e) = primary.seek(0.0) {
                    debug!("repeat-one seek failed: {e}");
                }
                self.state.set_progress(0.0).await;
                match primary.play() {
                    Ok(()) => self.state.set_transport(TransportState::Playing).await,
                    Err(e) => warn!("repeat-one restart failed: {e}"),
                }
            }
            _ => {
                self.state.set_transport(TransportState::Ended).await;
                self.advance_queue_on_end().await;
            }
        }
    }

    async fn position_poll_loop(&self) {
        let mut ticker = tokio::time::interval(POSITION_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if self.state.transport().await != TransportState::Playing {
                continue;
            }

            let primary = self.primary();
            let duration = match primary.duration_secs() {
                Some(d) if d > 0.0 => d,
                _ => self.state.duration_secs().await,
            };
            if duration <= 0.0 {
                continue;
            }
            let position = primary.position_secs();
            let progress = (position / duration).clamp(0.0, 1.0);
            self.state.set_progress(progress).await;

            if let Some(track) = self.state.current_track().await {
                self.state
                    .broadcast_event(segue_common::events::PlayerEvent::PlaybackProgress {
                        track_id: track.id.clone(),
                        progress,
                        duration_secs: duration,
                        timestamp: chrono::Utc::now(),
                    });
            }

            self.maybe_arm_crossfade(position, duration).await;
        }
        debug!("position poll loop stopped");
    }
}
