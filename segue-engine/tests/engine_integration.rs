//! Engine transport and queue-progression integration tests, driven
//! through simulated output handles.

mod helpers;

use helpers::{playable_track, unresolved_track, wait_for_event, MockProvider, TestEngine};
use segue_common::events::{PlayerEvent, TransportState};
use segue_common::model::RepeatMode;
use segue_engine::output::AudioOutput;
use segue_engine::resolver::{ResolvedStream, StreamProvider};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn load_commits_track_and_plays() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    let track = playable_track(1);
    harness.engine.load(track.clone(), true).await;

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::TrackChanged { track: t, .. } if t.id == track.id)
    })
    .await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;

    let snapshot = harness.engine.state().snapshot().await;
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track.unwrap().id, track.id);
    assert_eq!(
        harness.primary_sim().loaded_url().as_deref(),
        track.stream_url.as_deref()
    );
}

#[tokio::test]
async fn load_without_autoplay_stops_at_ready() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    harness.engine.load(playable_track(1), false).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Ready,
                ..
            }
        )
    })
    .await;
    assert!(!harness.engine.state().is_playing().await);

    // play() on a Ready engine starts the device.
    harness.engine.play().await;
    assert!(harness.engine.state().is_playing().await);
}

/// A provider whose alternate lookup is slow, to make an early load's
/// resolution arrive after a later load has committed.
struct SlowProvider {
    delay: Duration,
    url: String,
}

#[async_trait::async_trait]
impl StreamProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn lookup_alternate(
        &self,
        _track: &segue_common::model::Track,
    ) -> segue_engine::error::Result<Option<ResolvedStream>> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(ResolvedStream {
            stream_url: self.url.clone(),
            artwork_url: None,
        }))
    }

    async fn search(
        &self,
        _query: &str,
    ) -> segue_engine::error::Result<Vec<segue_common::model::Track>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn newer_load_supersedes_older_resolution() {
    let provider = Arc::new(SlowProvider {
        delay: Duration::from_millis(200),
        url: "https://slow.example.com/a.mp3".into(),
    });
    let harness = TestEngine::new(vec![provider]).await;
    let mut rx = harness.engine.state().subscribe_events();

    // Track A needs the (slow) provider; track B has a direct URL.
    let track_a = unresolved_track(1);
    let track_b = playable_track(2);
    harness.engine.load(track_a.clone(), true).await;
    harness.engine.load(track_b.clone(), true).await;

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::TrackChanged { track, .. } if track.id == track_b.id)
    })
    .await;

    // Let A's late resolution arrive; its result must be discarded.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let current = harness.engine.state().current_track().await.unwrap();
    assert_eq!(current.id, track_b.id);
    // The device only ever saw B.
    assert_eq!(harness.primary_sim().load_count(), 1);
    assert_eq!(
        harness.primary_sim().loaded_url().as_deref(),
        track_b.stream_url.as_deref()
    );
}

#[tokio::test]
async fn volume_applies_quadratic_curve_to_device() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();
    harness.engine.load(playable_track(1), true).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;

    harness.engine.set_volume(0.5).await;
    assert_eq!(harness.engine.state().volume().await, 0.5);
    assert!((harness.primary_sim().current_gain() - 0.25).abs() < 1e-6);

    harness.engine.set_volume(0.0).await;
    assert_eq!(harness.primary_sim().current_gain(), 0.0);

    harness.engine.set_volume(1.0).await;
    assert_eq!(harness.primary_sim().current_gain(), 1.0);
}

#[tokio::test]
async fn seek_clamps_and_updates_progress_synchronously() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();
    harness.engine.load(playable_track(1), false).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Ready,
                ..
            }
        )
    })
    .await;

    harness.engine.seek(1.5).await;
    assert_eq!(harness.engine.state().progress().await, 1.0);

    harness.engine.seek(-0.5).await;
    assert_eq!(harness.engine.state().progress().await, 0.0);

    harness.engine.seek(0.25).await;
    assert_eq!(harness.engine.state().progress().await, 0.25);
    // 25% of the sim's 300 s default duration
    assert!((harness.primary_sim().position_secs() - 75.0).abs() < 1.0);
}

#[tokio::test]
async fn next_twice_moves_first_track_to_history() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    let track_a = playable_track(1);
    let track_b = playable_track(2);
    harness.engine.enqueue(track_a.clone()).await;
    harness.engine.enqueue(track_b.clone()).await;

    harness.engine.next_track().await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::TrackChanged { track, .. } if track.id == track_a.id)
    })
    .await;

    harness.engine.next_track().await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::TrackChanged { track, .. } if track.id == track_b.id)
    })
    .await;

    let current = harness.engine.state().current_track().await.unwrap();
    assert_eq!(current.id, track_b.id);

    let queue = harness.engine.queue_handle().read().await;
    assert!(queue.is_empty());
    let history: Vec<_> = queue.history().map(|t| t.id.clone()).collect();
    assert_eq!(history, vec![track_a.id]);
}

#[tokio::test]
async fn next_on_starved_queue_stops_without_corruption() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    let track = playable_track(1);
    harness.engine.load(track.clone(), true).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;

    // Queue empty, repeat off, no providers: next stops playback and
    // leaves the current track exactly as it was.
    harness.engine.next_track().await;

    let snapshot = harness.engine.state().snapshot().await;
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track.unwrap().id, track.id);
    let queue = harness.engine.queue_handle().read().await;
    assert_eq!(queue.history_len(), 0);
}

#[tokio::test]
async fn next_gives_up_after_bounded_candidate_retries() {
    let harness = TestEngine::new(vec![]).await;

    // Six unresolvable candidates; only five may be tried.
    for n in 1..=6 {
        harness.engine.enqueue(unresolved_track(n)).await;
    }
    harness.engine.next_track().await;

    let snapshot = harness.engine.state().snapshot().await;
    assert!(!snapshot.is_playing);

    let queue = harness.engine.queue_handle().read().await;
    assert_eq!(queue.len(), 1, "sixth candidate must remain queued");
    assert_eq!(queue.history_len(), 5, "five failed candidates retired");
}

#[tokio::test]
async fn repeat_all_replays_history_when_queue_empties() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    let track_a = playable_track(1);
    let track_b = playable_track(2);
    harness.engine.load(track_a.clone(), true).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::TrackChanged { track, .. } if track.id == track_a.id)
    })
    .await;

    // Off -> All
    assert_eq!(harness.engine.cycle_repeat_mode().await, RepeatMode::All);
    harness
        .engine
        .queue_handle()
        .write()
        .await
        .push_history(track_b.clone());

    harness.engine.next_track().await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::TrackChanged { track, .. } if track.id == track_b.id)
    })
    .await;

    let current = harness.engine.state().current_track().await.unwrap();
    assert_eq!(current.id, track_b.id);
}

#[tokio::test]
async fn repeat_one_restarts_track_on_natural_end() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    let track = playable_track(1);
    harness.engine.load(track.clone(), true).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;

    // Off -> All -> One
    harness.engine.cycle_repeat_mode().await;
    assert_eq!(harness.engine.cycle_repeat_mode().await, RepeatMode::One);

    harness.primary_sim().advance(240.0);
    harness.primary_sim().emit_ended();

    // The transport never leaves Playing on a repeat-one restart, so no
    // state-change event fires; watch the device come back instead.
    tokio::time::timeout(WAIT, async {
        loop {
            if harness.primary_sim().position_secs() < 1.0
                && harness.engine.state().is_playing().await
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("track did not restart");

    let snapshot = harness.engine.state().snapshot().await;
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.current_track.unwrap().id, track.id);
    assert!(snapshot.progress < 0.05, "restart left progress at {}", snapshot.progress);
    // History untouched; no queue movement happened.
    assert_eq!(harness.engine.queue_handle().read().await.history_len(), 0);
    assert!(harness.primary_sim().position_secs() < 1.0);
}

#[tokio::test]
async fn previous_in_opening_window_restarts_current() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    let track_a = playable_track(1);
    let track_b = playable_track(2);
    harness.engine.load(track_b.clone(), true).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;
    harness
        .engine
        .queue_handle()
        .write()
        .await
        .push_history(track_a.clone());

    // Within the first 5%: restart instead of going back.
    harness.engine.state().set_progress(0.02).await;
    harness.engine.previous_track().await;

    let current = harness.engine.state().current_track().await.unwrap();
    assert_eq!(current.id, track_b.id);
    assert_eq!(harness.engine.state().progress().await, 0.0);
    assert_eq!(
        harness.engine.queue_handle().read().await.history_len(),
        1,
        "history untouched by restart"
    );
}

#[tokio::test]
async fn previous_past_window_returns_to_history() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    let track_a = playable_track(1);
    let track_b = playable_track(2);
    harness.engine.load(track_b.clone(), true).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;
    harness
        .engine
        .queue_handle()
        .write()
        .await
        .push_history(track_a.clone());

    harness.engine.state().set_progress(0.5).await;
    harness.engine.previous_track().await;

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::TrackChanged { track, .. } if track.id == track_a.id)
    })
    .await;

    let current = harness.engine.state().current_track().await.unwrap();
    assert_eq!(current.id, track_a.id);
    // The interrupted track went back to the head of the queue.
    let queue = harness.engine.queue_handle().read().await;
    assert_eq!(queue.peek_next().unwrap().id, track_b.id);
}

#[tokio::test]
async fn play_after_terminal_stop_reloads_last_track() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    let track = playable_track(1);
    harness.engine.load(track.clone(), true).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;

    // Natural end with nothing queued: playback stops.
    harness.primary_sim().emit_ended();
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Ended,
                ..
            }
        )
    })
    .await;
    let loads_before = harness.primary_sim().load_count();

    // play() on an engine with no loaded source re-triggers a load of
    // the last known track rather than erroring.
    harness.engine.play().await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;
    assert!(harness.primary_sim().load_count() > loads_before);
    assert_eq!(
        harness.engine.state().current_track().await.unwrap().id,
        track.id
    );
}

#[tokio::test]
async fn device_error_retries_once_via_fallback() {
    let provider = MockProvider::with_alternate("1", "https://alt.example.com/1.mp3");
    let harness = TestEngine::new(vec![provider]).await;
    let mut rx = harness.engine.state().subscribe_events();

    // First device load fails; the engine must re-resolve through the
    // fallback chain exactly once and recover.
    harness.primary_sim().fail_next_loads(1);
    harness.engine.load(playable_track(1), true).await;

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;

    assert_eq!(
        harness.primary_sim().loaded_url().as_deref(),
        Some("https://alt.example.com/1.mp3")
    );
}

#[tokio::test]
async fn device_failure_without_fallback_is_surfaced() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    harness.primary_sim().fail_next_loads(1);
    harness.engine.load(playable_track(1), true).await;

    // No providers: the single fallback retry exhausts resolution and the
    // failure surfaces as a user-visible event, not a crash.
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::PlaybackError { .. })
    })
    .await;
    assert_eq!(
        harness.engine.state().transport().await,
        TransportState::Error
    );
    assert!(!harness.engine.state().is_playing().await);
}

#[tokio::test]
async fn second_device_failure_is_terminal_for_the_track() {
    // Fallback resolution succeeds, but the replacement stream fails too:
    // the engine must not retry a third time.
    let provider = MockProvider::with_alternate("1", "https://alt.example.com/1.mp3");
    let harness = TestEngine::new(vec![provider]).await;
    let mut rx = harness.engine.state().subscribe_events();

    harness.primary_sim().fail_next_loads(2);
    harness.engine.load(playable_track(1), true).await;

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::PlaybackError { .. })
    })
    .await;
    assert_eq!(
        harness.engine.state().transport().await,
        TransportState::Error
    );
    // Exactly two device loads: original + one fallback retry.
    assert_eq!(harness.primary_sim().load_count(), 2);
}

#[tokio::test]
async fn equalizer_round_trip_and_graph_build() {
    let harness = TestEngine::new(vec![]).await;
    let mut rx = harness.engine.state().subscribe_events();

    harness.engine.load(playable_track(1), true).await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::PlaybackStateChanged {
                new_state: TransportState::Playing,
                ..
            }
        )
    })
    .await;
    assert_eq!(harness.primary_sim().graph_build_count(), 1);

    // Gains clamp on write and read back clamped.
    harness.engine.set_eq_band(3, 40.0).await;
    assert_eq!(harness.engine.eq_bands().await[3], 12.0);
    harness.engine.set_eq_band(3, -40.0).await;
    assert_eq!(harness.engine.eq_bands().await[3], -12.0);
    harness.engine.set_eq_band(3, 4.5).await;
    assert_eq!(harness.engine.eq_bands().await[3], 4.5);
    assert_eq!(harness.primary_sim().eq_gains().unwrap()[3], 4.5);

    assert!(!harness.primary_sim().eq_enabled());
    harness.engine.set_eq_enabled(true).await;
    assert!(harness.primary_sim().eq_enabled());

    // A second activation must not build the graph twice on the same
    // handle.
    harness.engine.set_eq_band(0, 2.0).await;
    assert_eq!(harness.primary_sim().graph_build_count(), 1);
}
