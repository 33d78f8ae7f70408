//! Queue continuity integration tests: autoplay refill on exhaustion,
//! dedup against known tracks, and the append cap.

mod helpers;

use helpers::{playable_track, wait_for_event, MockProvider, TestEngine};
use segue_common::events::{PlayerEvent, QueueChangeTrigger, TransportState};
use segue_common::model::Track;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

fn discovered(n: u32) -> Track {
    playable_track(1000 + n)
}

#[tokio::test]
async fn empty_queue_refills_from_continuity_search() {
    let results = vec![discovered(1), discovered(2), discovered(3)];
    let provider = MockProvider::with_search_results(vec![results.clone(), vec![]]);
    let harness = TestEngine::new(vec![provider]).await;
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

    harness.engine.next_track().await;

    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::QueueChanged {
                trigger: QueueChangeTrigger::Autoplay,
                ..
            }
        )
    })
    .await;

    // One discovered track is now playing, the rest remain queued.
    let current = harness.engine.state().current_track().await.unwrap();
    assert!(results.iter().any(|t| t.id == current.id));
    let queue = harness.engine.queue_handle().read().await;
    assert_eq!(queue.len(), results.len() - 1);
    assert!(harness.engine.state().is_playing().await);
}

#[tokio::test]
async fn refill_excludes_current_and_history_tracks() {
    let current = playable_track(1);
    let played = playable_track(2);
    let fresh = discovered(3);

    // The provider offers the current track and an already-played track
    // alongside one genuinely new candidate.
    let provider = MockProvider::with_search_results(vec![
        vec![current.clone(), played.clone(), fresh.clone()],
        vec![],
    ]);
    let harness = TestEngine::new(vec![provider]).await;
    let mut rx = harness.engine.state().subscribe_events();

    harness.engine.load(current.clone(), true).await;
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
        .push_history(played.clone());

    harness.engine.next_track().await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(e, PlayerEvent::TrackChanged { track, .. } if track.id == fresh.id)
    })
    .await;

    assert_eq!(
        harness.engine.state().current_track().await.unwrap().id,
        fresh.id
    );
    assert!(harness.engine.queue_handle().read().await.is_empty());
}

#[tokio::test]
async fn refill_appends_at_most_fifteen_tracks() {
    let many: Vec<Track> = (1..=40).map(discovered).collect();
    let provider = MockProvider::with_search_results(vec![many, vec![]]);
    let harness = TestEngine::new(vec![provider]).await;
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

    harness.engine.next_track().await;
    wait_for_event(&mut rx, WAIT, |e| {
        matches!(
            e,
            PlayerEvent::QueueChanged {
                trigger: QueueChangeTrigger::Autoplay,
                ..
            }
        )
    })
    .await;

    // Fifteen appended, one of which is already playing.
    assert_eq!(harness.engine.queue_handle().read().await.len(), 14);
}

#[tokio::test]
async fn natural_end_with_no_results_stops_playback() {
    let provider = MockProvider::empty();
    let harness = TestEngine::new(vec![provider]).await;
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

    // Continuity found nothing; playback stops with state intact.
    let snapshot = harness.engine.state().snapshot().await;
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.current_track.unwrap().id, track.id);
}
