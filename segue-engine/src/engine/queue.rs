//! Queue progression for PlayerEngine
//!
//! next/previous, shuffle and repeat, and the continuity refill that
//! keeps the queue from silently starving. `next` tries a bounded number
//! of candidates (a resolved track can still fail to produce a stream);
//! when the queue is empty it replays history under repeat-all or asks
//! the continuity manager for replacements, and otherwise stops cleanly
//! with the current track intact.

use super::core::{LoadTicket, PlayerEngine};
use crate::continuity::ContinuityContext;
use crate::output::AudioOutput;
use segue_common::events::{PlayerEvent, QueueChangeTrigger, TransportState};
use segue_common::model::{RepeatMode, Track};
use segue_common::params::{NEXT_TRACK_MAX_ATTEMPTS, PREVIOUS_RESTART_WINDOW};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

impl PlayerEngine {
    /// Skip to the next queued track.
    pub async fn next_track(&self) {
        self.cancel_crossfade("manual skip").await;
        self.advance_queue(QueueChangeTrigger::UserAction).await;
    }

    /// Natural end-of-track advance.
    pub(super) async fn advance_queue_on_end(&self) {
        self.advance_queue(QueueChangeTrigger::TrackFinished).await;
    }

    async fn advance_queue(&self, trigger: QueueChangeTrigger) {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut outgoing = self.state.current_track().await;
        let mut tried_refill = false;

        for attempt in 1..=NEXT_TRACK_MAX_ATTEMPTS {
            let candidate = {
                let mut queue = self.queue.write().await;
                if queue.is_empty()
                    && self.state.repeat_mode().await == RepeatMode::All
                    && queue.history_len() > 0
                {
                    let replayed = queue.replay_history();
                    debug!("repeat-all: replaying {replayed} tracks from history");
                }
                queue.advance(None)
            };

            let Some(candidate) = candidate else {
                // Queue exhausted: one continuity refill per advance.
                if tried_refill {
                    break;
                }
                tried_refill = true;
                if self.replenish_queue().await {
                    continue;
                }
                break;
            };

            debug!(
                "advance attempt {attempt}/{NEXT_TRACK_MAX_ATTEMPTS}: {}",
                candidate.id
            );
            match self.resolver.resolve(&candidate).await {
                Ok(resolved) => {
                    if self.is_stale(generation) {
                        debug!("advance superseded by newer operation");
                        return;
                    }
                    // The replaced track goes to the front of history
                    // only once a successor actually takes over.
                    if let Some(finished) = outgoing.take() {
                        self.queue.write().await.push_history(finished);
                    }
                    *self.current_load.write().await = Some(LoadTicket {
                        generation,
                        track: candidate.clone(),
                        auto_play: true,
                        tried_fallback: false,
                    });
                    self.state.set_transport(TransportState::Loading).await;
                    self.commit_resolved_load(generation, candidate, resolved)
                        .await;
                    self.broadcast_queue_changed(trigger).await;
                    return;
                }
                Err(e) => {
                    // The candidate left the queue for playback; it still
                    // belongs in history.
                    debug!("candidate {} unplayable: {e}", candidate.id);
                    self.queue.write().await.push_history(candidate);
                }
            }
        }

        // Bounded retries exhausted or queue starved: stop cleanly. The
        // current track is left untouched.
        info!("queue advance stopped: no playable track found");
        self.primary().pause();
        self.state
            .set_transport(match trigger {
                QueueChangeTrigger::TrackFinished => TransportState::Ended,
                _ => TransportState::Paused,
            })
            .await;
        self.broadcast_queue_changed(trigger).await;
    }

    /// Go back: restart the current track when within the opening window
    /// (or with no history), otherwise return the current track to the
    /// head of the queue and load the most recent history entry.
    pub async fn previous_track(&self) {
        self.cancel_crossfade("manual previous").await;

        let progress = self.state.progress().await;
        let within_opening = progress <= PREVIOUS_RESTART_WINDOW;

        let history_entry = if within_opening {
            None
        } else {
            self.queue.write().await.pop_history()
        };

        match history_entry {
            Some(previous) => {
                if let Some(current) = self.state.current_track().await {
                    self.queue.write().await.push_front(current);
                }
                self.broadcast_queue_changed(QueueChangeTrigger::UserAction)
                    .await;
                self.load(previous, true).await;
            }
            None => {
                debug!("previous: restarting current track");
                self.state.set_progress(0.0).await;
                if let Err(e) = self.primary().seek(0.0) {
                    debug!("restart seek failed: {e}");
                }
                if !self.state.is_playing().await {
                    self.play().await;
                }
            }
        }
    }

    /// Toggle shuffle; enabling reorders the live queue immediately.
    pub async fn toggle_shuffle(&self) {
        let enabled = !self.state.shuffle().await;
        self.state.set_shuffle(enabled).await;
        if enabled {
            self.queue.write().await.shuffle();
            self.broadcast_queue_changed(QueueChangeTrigger::Shuffle).await;
        }
        info!("shuffle {}", if enabled { "on" } else { "off" });
    }

    pub async fn cycle_repeat_mode(&self) -> RepeatMode {
        let mode = self.state.repeat_mode().await.cycled();
        self.state.set_repeat_mode(mode).await;
        info!("repeat mode: {mode:?}");
        mode
    }

    /// Append a track to the queue (user action).
    pub async fn enqueue(&self, track: Track) {
        self.queue.write().await.enqueue(track);
        self.broadcast_queue_changed(QueueChangeTrigger::UserAction)
            .await;
    }

    /// Clear the upcoming queue (history is untouched).
    pub async fn clear_queue(&self) {
        self.queue.write().await.clear_upcoming();
        self.broadcast_queue_changed(QueueChangeTrigger::UserAction)
            .await;
    }

    /// Ask the continuity manager for replacements and append them.
    /// Returns whether anything was added.
    pub(super) async fn replenish_queue(&self) -> bool {
        let current = self.state.current_track().await;
        let (recent, mut exclude) = {
            let queue = self.queue.read().await;
            let recent: Vec<Track> = queue.history().cloned().collect();
            (recent, queue.known_ids())
        };
        if let Some(track) = &current {
            exclude.insert(track.id.clone());
        }

        let found = self
            .continuity
            .replenish(&ContinuityContext {
                current,
                recent,
                exclude,
            })
            .await;

        if found.is_empty() {
            warn!("continuity search found no replacement tracks");
            return false;
        }

        info!("continuity search queued {} tracks", found.len());
        self.queue.write().await.enqueue_all(found);
        self.broadcast_queue_changed(QueueChangeTrigger::Autoplay)
            .await;
        true
    }

    pub(super) async fn broadcast_queue_changed(&self, trigger: QueueChangeTrigger) {
        let upcoming = self.queue.read().await.upcoming_ids();
        self.state.broadcast_event(PlayerEvent::QueueChanged {
            upcoming,
            trigger,
            timestamp: chrono::Utc::now(),
        });
    }
}
