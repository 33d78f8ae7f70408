//! Crossfade sub-state-machine
//!
//! Armed -> Fading -> Swapped. Arming preloads the next queued track on
//! the secondary output handle at zero gain and waits (bounded) for it to
//! report ready; the fade ramps both handles linearly over discrete steps
//! under a shared applied-volume ceiling so the summed gain equals the
//! pre-fade gain at every step. Completion swaps which slot is primary,
//! rebuilds the equalizer graph against the new primary handle, pops the
//! queue head, and resumes progress tracking on the new handle.
//!
//! Cancellation leaves no partial-swap state: a session that has started
//! fading is finalized immediately (incoming promoted at full ceiling,
//! outgoing torn down); a session still Armed tears down the preload and
//! leaves the primary untouched.

use super::core::PlayerEngine;
use crate::output::{AudioOutput, DeviceEvent};
use segue_common::curves::{applied_volume, crossfade_gains};
use segue_common::events::{PlayerEvent, QueueChangeTrigger, TransportState};
use segue_common::model::Track;
use segue_common::params::{CROSSFADE_PRELOAD_TIMEOUT, CROSSFADE_STEPS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossfadePhase {
    /// Preloading the incoming track on the secondary handle.
    Armed,
    /// Volume ramps running on both handles.
    Fading,
    /// Handles swapped; the session is finished.
    Swapped,
}

/// Transient state of one in-progress blended transition.
pub(super) struct CrossfadeSession {
    pub source: Track,
    pub target: Track,
    /// Target with its resolved stream URL, available once Armed
    /// preloading has resolved it.
    pub resolved_target: Option<Track>,
    pub phase: CrossfadePhase,
    pub elapsed_steps: u32,
    pub total_steps: u32,
    /// Applied (post-curve) volume when the session was armed; both ramps
    /// share it.
    pub ceiling: f32,
    pub cancelled: Arc<AtomicBool>,
}

impl PlayerEngine {
    /// Called from the position poll: arm a crossfade when the track tail
    /// is inside the crossfade window and nothing is armed yet.
    pub(super) async fn maybe_arm_crossfade(&self, position: f64, duration: f64) {
        let crossfade_secs = *self.crossfade_seconds.read().await;
        if crossfade_secs <= 0.0 {
            return;
        }
        if duration <= 0.0 || duration - position > crossfade_secs {
            return;
        }

        let mut session_slot = self.crossfade.lock().await;
        if session_slot.is_some() {
            return;
        }
        let Some(source) = self.state.current_track().await else {
            return;
        };
        let Some(target) = self.queue.read().await.peek_next().cloned() else {
            // Nothing queued; natural end handles continuity.
            return;
        };

        let ceiling = applied_volume(self.state.volume().await);
        let cancelled = Arc::new(AtomicBool::new(false));
        *session_slot = Some(CrossfadeSession {
            source: source.clone(),
            target: target.clone(),
            resolved_target: None,
            phase: CrossfadePhase::Armed,
            elapsed_steps: 0,
            total_steps: CROSSFADE_STEPS,
            ceiling,
            cancelled: Arc::clone(&cancelled),
        });
        drop(session_slot);

        info!(
            "crossfade armed: {} -> {} over {:.1}s",
            source.id, target.id, crossfade_secs
        );

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_crossfade(target, ceiling, cancelled, crossfade_secs).await;
        });
    }

    /// Drive one session from preload through swap. Never blocks primary
    /// playback: preload failures and timeouts abandon the crossfade and
    /// let the track play to its natural end.
    async fn run_crossfade(
        &self,
        target: Track,
        ceiling: f32,
        cancelled: Arc<AtomicBool>,
        crossfade_secs: f64,
    ) {
        let secondary = self.secondary();

        // Resolve the incoming track's stream.
        let resolved = match self.resolver.resolve(&target).await {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!("crossfade abandoned: target resolution failed: {e}");
                self.abandon_crossfade().await;
                return;
            }
        };
        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        let mut resolved_target = target.with_stream_url(&resolved.stream_url);
        if resolved_target.artwork_url.is_none() {
            if let Some(artwork) = resolved.artwork_url {
                resolved_target = resolved_target.with_artwork_url(artwork);
            }
        }
        {
            let mut session = self.crossfade.lock().await;
            match session.as_mut() {
                Some(s) => s.resolved_target = Some(resolved_target.clone()),
                None => return, // cancelled underneath us
            }
        }

        // Preload at zero gain and wait for readiness, bounded.
        secondary.set_gain(0.0);
        let mut events = secondary.subscribe();
        let loaded = match secondary.load(&resolved.stream_url).await {
            Ok(handle) => handle,
            Err(e) => {
                debug!("crossfade abandoned: preload failed: {e}");
                self.abandon_crossfade().await;
                return;
            }
        };

        let ready = tokio::time::timeout(CROSSFADE_PRELOAD_TIMEOUT, async {
            loop {
                match events.recv().await {
                    Ok(DeviceEvent::ReadyToPlay { handle }) if handle == loaded => break true,
                    Ok(DeviceEvent::Error { handle, message }) if handle == loaded => {
                        debug!("crossfade preload error: {message}");
                        break false;
                    }
                    Ok(_) => continue,
                    Err(_) => break false,
                }
            }
        })
        .await
        .unwrap_or(false);

        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        if !ready {
            // Abandoned silently; playback continues to natural end.
            debug!("crossfade abandoned: preload not ready within timeout");
            secondary.stop();
            self.abandon_crossfade().await;
            return;
        }

        // Fading.
        {
            let mut session = self.crossfade.lock().await;
            match session.as_mut() {
                Some(s) => s.phase = CrossfadePhase::Fading,
                None => return,
            }
        }
        if let Err(e) = secondary.play() {
            debug!("crossfade abandoned: incoming handle refused play: {e}");
            secondary.stop();
            self.abandon_crossfade().await;
            return;
        }

        let primary = self.primary();
        let step_interval = Duration::from_secs_f64(crossfade_secs / CROSSFADE_STEPS as f64);
        let mut ticker = tokio::time::interval(step_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // first tick fires immediately

        for step in 1..=CROSSFADE_STEPS {
            ticker.tick().await;
            // Gains are written only while the session still exists,
            // under its lock: a canceller removes the session first, so a
            // finalized swap's gain can never be overwritten by a late
            // ramp step.
            let mut session = self.crossfade.lock().await;
            match session.as_mut() {
                Some(s) if !s.cancelled.load(Ordering::SeqCst) => {
                    s.elapsed_steps = step;
                    let (outgoing, incoming) = crossfade_gains(step, CROSSFADE_STEPS, ceiling);
                    primary.set_gain(outgoing);
                    secondary.set_gain(incoming);
                }
                _ => return,
            }
        }

        // Swap.
        let session = {
            let mut slot = self.crossfade.lock().await;
            let completing =
                matches!(slot.as_ref(), Some(s) if !s.cancelled.load(Ordering::SeqCst));
            if completing {
                if let Some(s) = slot.as_mut() {
                    s.phase = CrossfadePhase::Swapped;
                }
                slot.take()
            } else {
                None
            }
        };
        if let Some(session) = session {
            let target = session
                .resolved_target
                .clone()
                .unwrap_or(session.target.clone());
            self.finalize_swap(target).await;
        }
    }

    /// Cancel any active session. Armed sessions tear down the preload;
    /// Fading sessions complete the swap immediately so no partial-swap
    /// state survives the interrupting action.
    pub(super) async fn cancel_crossfade(&self, reason: &str) {
        let session = self.crossfade.lock().await.take();
        let Some(session) = session else { return };
        session.cancelled.store(true, Ordering::SeqCst);

        match session.phase {
            CrossfadePhase::Armed => {
                debug!(
                    "crossfade preload of {} cancelled ({reason})",
                    session.target.id
                );
                self.secondary().stop();
            }
            CrossfadePhase::Fading => {
                info!(
                    "crossfade {} -> {} interrupted at step {}/{} ({reason}); finalizing swap",
                    session.source.id, session.target.id, session.elapsed_steps, session.total_steps
                );
                let target = session
                    .resolved_target
                    .clone()
                    .unwrap_or(session.target.clone());
                self.finalize_swap(target).await;
            }
            CrossfadePhase::Swapped => {}
        }
    }

    /// Clear an Armed session that never reached the fade.
    async fn abandon_crossfade(&self) {
        let mut slot = self.crossfade.lock().await;
        if matches!(slot.as_ref(), Some(s) if s.phase == CrossfadePhase::Armed) {
            *slot = None;
        }
    }

    /// Promote the incoming handle to primary and finish bookkeeping:
    /// tear down the outgoing handle, rebuild the equalizer graph against
    /// the new primary, pop the queue head into place, and resume
    /// tracking on the new handle.
    pub(super) async fn finalize_swap(&self, target: Track) {
        let old_slot = self.swap_primary();
        let outgoing = Arc::clone(&self.outputs[old_slot]);
        outgoing.stop();
        self.equalizer.retire_slot(old_slot);

        let finished = self.state.current_track().await;
        {
            let mut queue = self.queue.write().await;
            match queue.advance(finished) {
                Some(popped) if popped.id == target.id => {}
                Some(popped) => {
                    // Queue was edited mid-fade; keep the popped entry's
                    // place in line.
                    debug!("queue head changed mid-fade: {} back to front", popped.id);
                    queue.push_front(popped);
                }
                None => {}
            }
        }

        let primary = self.primary();
        let duration = primary.duration_secs().unwrap_or(target.duration_secs);
        self.state.set_current_track(Some(target.clone())).await;
        self.state.set_duration_secs(duration).await;
        self.state.set_progress(0.0).await;
        self.state.set_transport(TransportState::Playing).await;
        *self.last_track.write().await = Some(target.clone());

        // Re-point the load ticket at the swapped-in track so a later
        // device failure retries the right one.
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.current_load.write().await = Some(super::core::LoadTicket {
            generation,
            track: target.clone(),
            auto_play: true,
            tried_fallback: false,
        });

        self.equalizer.activate(primary.as_ref()).await;
        primary.set_gain(applied_volume(self.state.volume().await));

        self.state.broadcast_event(PlayerEvent::TrackChanged {
            track: target.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.broadcast_queue_changed(QueueChangeTrigger::TrackFinished)
            .await;

        if let Err(e) = crate::db::settings::set_last_track(&self.db, &target).await {
            warn!("failed to persist last track after swap: {e}");
        }

        info!("crossfade complete: now playing {}", target.id);
    }
}
