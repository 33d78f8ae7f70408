//! Transport operations for PlayerEngine
//!
//! load / play / pause / toggle / seek / volume, plus the device-failure
//! retry path. Failure policy: everything is recovered here. A failed
//! load resolves to a user-visible notification and a stable state, never
//! an error returned to the caller; abort-class device errors are
//! swallowed as benign.

use super::core::{LoadTicket, PlayerEngine};
use crate::db;
use crate::output::{AudioOutput, OutputError};
use crate::resolver::ResolvedStream;
use segue_common::curves::applied_volume;
use segue_common::events::{ErrorSeverity, PlayerEvent, TransportState};
use segue_common::model::Track;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

impl PlayerEngine {
    /// Load a track, superseding any in-flight load and resetting any
    /// active crossfade. Returns once resolution has been kicked off;
    /// failures surface as a `PlaybackError` event, not an error to the
    /// caller.
    pub async fn load(&self, track: Track, auto_play: bool) {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("load requested: {track} (generation {generation})");

        self.cancel_crossfade("new load").await;
        self.state.set_transport(TransportState::Loading).await;
        *self.current_load.write().await = Some(LoadTicket {
            generation,
            track: track.clone(),
            auto_play,
            tried_fallback: false,
        });

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_load(generation, track).await;
        });
    }

    /// Resolution + commit stage of a load. Every step re-checks the
    /// load generation so results of a superseded load are discarded.
    async fn run_load(&self, generation: u64, track: Track) {
        let resolved = match self.resolver.resolve(&track).await {
            Ok(resolved) => resolved,
            Err(e) => {
                if self.is_stale(generation) {
                    debug!("discarding stale failed resolution for {}", track.id);
                    return;
                }
                warn!("resolution exhausted for {}: {e}", track.id);
                self.surface_resolution_failure(&track).await;
                return;
            }
        };

        if self.is_stale(generation) {
            debug!("discarding stale resolution result for {}", track.id);
            return;
        }

        self.commit_resolved_load(generation, track, resolved).await;
    }

    /// Commit a resolved stream: update current track, notify, and hand
    /// the URL to the primary output. Shared by `load` and the queue
    /// advance path.
    pub(super) fn commit_resolved_load<'a>(
        &'a self,
        generation: u64,
        track: Track,
        resolved: ResolvedStream,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        // Returned as a boxed, explicitly-`Send` future: this future and
        // `retry_via_fallback` are mutually recursive across a
        // `tokio::spawn`, and erasing the type here breaks the auto-trait
        // cycle the spawn `Send` bound would otherwise have to resolve.
        Box::pin(async move {
        let mut track = track.with_stream_url(&resolved.stream_url);
        if track.artwork_url.is_none() {
            if let Some(artwork) = resolved.artwork_url {
                track = track.with_artwork_url(artwork);
            }
        }

        self.state.set_current_track(Some(track.clone())).await;
        self.state.set_duration_secs(track.duration_secs).await;
        self.state.set_progress(0.0).await;
        *self.last_track.write().await = Some(track.clone());
        {
            let mut ticket = self.current_load.write().await;
            if let Some(t) = ticket.as_mut() {
                if t.generation == generation {
                    t.track = track.clone();
                }
            }
        }

        // Play counting happens at load commit, by design.
        self.state.broadcast_event(PlayerEvent::TrackChanged {
            track: track.clone(),
            timestamp: chrono::Utc::now(),
        });

        if let Err(e) = db::settings::set_last_track(&self.db, &track).await {
            warn!("failed to persist last track: {e}");
        }

        let primary = self.primary();
        match primary.load(&resolved.stream_url).await {
            Ok(_) => {}
            Err(OutputError::Aborted(msg)) => {
                // A newer operation started; expected, never surfaced.
                debug!("device load aborted (benign): {msg}");
            }
            Err(e) => {
                if self.is_stale(generation) {
                    return;
                }
                warn!("stream open failed for {}: {e}", track.id);
                self.retry_via_fallback(generation, &format!("stream open failed: {e}"))
                    .await;
            }
        }
        // ReadyToPlay continues the flow (auto-play, EQ attach).
        })
    }

    /// Device-level decode/network failure: retried once per load via the
    /// fallback path; the second failure is terminal for the track.
    pub(super) async fn on_device_error(&self, message: String) {
        let ticket = self.current_load.read().await.clone();
        let Some(ticket) = ticket else {
            debug!("device error with no load in flight: {message}");
            return;
        };
        if self.is_stale(ticket.generation) {
            return;
        }
        warn!("device error for {}: {message}", ticket.track.id);
        self.retry_via_fallback(ticket.generation, &message).await;
    }

    async fn retry_via_fallback(&self, generation: u64, reason: &str) {
        let ticket = {
            let mut guard = self.current_load.write().await;
            match guard.as_mut() {
                Some(t) if t.generation == generation => {
                    if t.tried_fallback {
                        None
                    } else {
                        t.tried_fallback = true;
                        Some(t.clone())
                    }
                }
                _ => return,
            }
        };

        let Some(ticket) = ticket else {
            // Fallback already spent for this load; terminal.
            let track = self.state.current_track().await;
            warn!("second stream failure, giving up on this track: {reason}");
            self.state.broadcast_event(PlayerEvent::PlaybackError {
                message: match &track {
                    Some(t) => format!("Playback failed for {} - {}", t.artist, t.title),
                    None => "Playback failed".to_string(),
                },
                severity: ErrorSeverity::Error,
                timestamp: chrono::Utc::now(),
            });
            self.state.set_transport(TransportState::Error).await;
            return;
        };

        info!(
            "retrying {} via fallback resolution ({reason})",
            ticket.track.id
        );
        self.state.set_transport(TransportState::Loading).await;

        // Strip the failed URL so the resolver goes straight to the
        // fallback chain.
        let mut bare = ticket.track.clone();
        bare.stream_url = None;

        let engine = self.clone();
        tokio::spawn(async move {
            match engine.resolver.resolve(&bare).await {
                Ok(resolved) => {
                    if engine.is_stale(generation) {
                        return;
                    }
                    engine
                        .commit_resolved_load(generation, bare, resolved)
                        .await;
                }
                Err(e) => {
                    if engine.is_stale(generation) {
                        return;
                    }
                    warn!("fallback resolution failed for {}: {e}", bare.id);
                    engine.surface_resolution_failure(&bare).await;
                }
            }
        });
    }

    async fn surface_resolution_failure(&self, track: &Track) {
        self.state.broadcast_event(PlayerEvent::PlaybackError {
            message: format!(
                "No playable stream found for {} - {}",
                track.artist, track.title
            ),
            severity: ErrorSeverity::Warning,
            timestamp: chrono::Utc::now(),
        });
        // Halt without corrupting state; a later play() retries the load.
        self.state.set_transport(TransportState::Error).await;
    }

    /// Start playback. On an engine with no loaded source this
    /// re-triggers a load of the last known track instead of erroring.
    pub async fn play(&self) {
        let _guard = self.transport_lock.lock().await;

        match self.state.transport().await {
            TransportState::Playing => {}
            TransportState::Loading => {
                // Pending load; just make sure it starts once ready.
                let mut ticket = self.current_load.write().await;
                if let Some(t) = ticket.as_mut() {
                    t.auto_play = true;
                }
            }
            TransportState::Ready | TransportState::Paused => {
                let primary = self.primary();
                match primary.play() {
                    Ok(()) => {
                        self.state.set_transport(TransportState::Playing).await;
                    }
                    Err(OutputError::Aborted(msg)) => {
                        debug!("play aborted (benign): {msg}");
                    }
                    Err(e) => {
                        warn!("play failed, re-triggering load: {e}");
                        self.reload_last(true).await;
                    }
                }
            }
            TransportState::Idle | TransportState::Ended | TransportState::Error => {
                self.reload_last(true).await;
            }
        }
    }

    /// Pause playback. Serialized behind the transport lock, so a pause
    /// issued while a play is pending resolves after it.
    pub async fn pause(&self) {
        let _guard = self.transport_lock.lock().await;

        self.cancel_crossfade("pause").await;

        match self.state.transport().await {
            TransportState::Playing | TransportState::Ready => {
                self.primary().pause();
                self.state.set_transport(TransportState::Paused).await;
            }
            TransportState::Loading => {
                let mut ticket = self.current_load.write().await;
                if let Some(t) = ticket.as_mut() {
                    t.auto_play = false;
                }
            }
            _ => {}
        }
    }

    pub async fn toggle(&self) {
        if self.state.is_playing().await {
            self.pause().await;
        } else {
            self.play().await;
        }
    }

    /// Seek to a normalized position in [0, 1]. Progress updates
    /// synchronously for responsive UI; the device position is polled
    /// back at the regular tick rate.
    pub async fn seek(&self, position: f64) {
        let position = position.clamp(0.0, 1.0);
        if self.state.current_track().await.is_none() {
            debug!("seek ignored: no current track");
            return;
        }
        self.cancel_crossfade("seek").await;

        let duration = self.state.duration_secs().await;
        self.state.set_progress(position).await;

        if duration > 0.0 {
            if let Err(e) = self.primary().seek(position * duration) {
                // Stream may still be buffering; the poll corrects later.
                debug!("device seek failed: {e}");
            }
        }
    }

    /// Store the linear volume, apply the quadratic perceptual curve to
    /// the device, persist, and notify.
    pub async fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.set_volume(volume).await;

        // During a fade the ramp owns device gain; the new volume lands
        // when the fade completes.
        if self.crossfade.lock().await.is_none() {
            self.primary().set_gain(applied_volume(volume));
        }

        if let Err(e) = db::settings::set_volume(&self.db, volume).await {
            warn!("failed to persist volume: {e}");
        }
        self.state.broadcast_event(PlayerEvent::VolumeChanged {
            volume,
            timestamp: chrono::Utc::now(),
        });
    }

    // --- equalizer API -------------------------------------------------

    pub async fn set_eq_enabled(&self, enabled: bool) {
        let primary = self.primary();
        if let Err(e) = self.equalizer.set_enabled(enabled, primary.as_ref()).await {
            warn!("equalizer enable failed: {e}");
        }
        self.broadcast_eq_changed().await;
    }

    pub async fn set_eq_band(&self, index: usize, gain: f32) {
        let primary = self.primary();
        if let Err(e) = self.equalizer.set_band(index, gain, primary.as_ref()).await {
            warn!("equalizer band update failed: {e}");
        }
        self.broadcast_eq_changed().await;
    }

    pub async fn apply_eq_preset(&self, bands: [f32; segue_common::model::EQ_BAND_COUNT]) {
        let primary = self.primary();
        if let Err(e) = self.equalizer.apply_preset(bands, primary.as_ref()).await {
            warn!("equalizer preset failed: {e}");
        }
        self.broadcast_eq_changed().await;
    }

    pub async fn eq_state(&self) -> segue_common::model::EqualizerState {
        self.equalizer.state().await
    }

    pub async fn eq_bands(&self) -> [f32; segue_common::model::EQ_BAND_COUNT] {
        self.equalizer.bands().await
    }

    async fn broadcast_eq_changed(&self) {
        self.state.broadcast_event(PlayerEvent::EqualizerChanged {
            state: self.equalizer.state().await,
            timestamp: chrono::Utc::now(),
        });
    }

    // --- helpers -------------------------------------------------------

    pub(super) fn is_stale(&self, generation: u64) -> bool {
        self.load_generation.load(Ordering::SeqCst) != generation
    }

    async fn reload_last(&self, auto_play: bool) {
        let last = match self.last_track.read().await.clone() {
            Some(track) => Some(track),
            None => self.state.current_track().await,
        };
        match last {
            Some(track) => self.load(track, auto_play).await,
            None => {
                debug!("play ignored: no last known track");
            }
        }
    }
}
