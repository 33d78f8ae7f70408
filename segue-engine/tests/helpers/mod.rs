//! Shared test helpers: engine harness over simulated outputs, a
//! scriptable stream provider, and track factories.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use segue_common::events::PlayerEvent;
use segue_common::model::{Platform, Track};
use segue_engine::engine::PlayerEngine;
use segue_engine::error::Result;
use segue_engine::output::{SharedOutput, SimOutput};
use segue_engine::resolver::{ResolvedStream, StreamProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Engine wired to two simulated outputs and an in-memory database.
pub struct TestEngine {
    pub engine: PlayerEngine,
    pub sims: [Arc<SimOutput>; 2],
}

impl TestEngine {
    pub async fn new(providers: Vec<Arc<dyn StreamProvider>>) -> Self {
        let db = segue_engine::db::open_in_memory().await.unwrap();
        let sim0 = Arc::new(SimOutput::new(0));
        let sim1 = Arc::new(SimOutput::new(1));
        let outputs: [SharedOutput; 2] = [sim0.clone(), sim1.clone()];
        let engine = PlayerEngine::new(db, providers, outputs).await.unwrap();
        engine.start();
        Self {
            engine,
            sims: [sim0, sim1],
        }
    }

    /// The sim behind the currently audible slot.
    pub fn primary_sim(&self) -> &Arc<SimOutput> {
        &self.sims[self.engine.primary_slot_index()]
    }

    /// The sim behind the preload slot.
    pub fn secondary_sim(&self) -> &Arc<SimOutput> {
        &self.sims[1 - self.engine.primary_slot_index()]
    }
}

/// A track whose stream URL validates without any provider.
pub fn playable_track(n: u32) -> Track {
    Track::new(
        format!("sc:{n}"),
        format!("Song {n}"),
        format!("Artist {n}"),
        240.0,
        Platform::SoundCloud,
    )
    .with_stream_url(format!("https://cdn.example.com/tracks/{n}.mp3"))
}

/// A track with no stream URL; resolution requires a provider.
pub fn unresolved_track(n: u32) -> Track {
    Track::new(
        format!("sc:{n}"),
        format!("Song {n}"),
        format!("Artist {n}"),
        240.0,
        Platform::SoundCloud,
    )
}

/// Await the first event matching `pred`, with a timeout.
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    timeout: Duration,
    mut pred: F,
) -> PlayerEvent
where
    F: FnMut(&PlayerEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Scriptable provider: per-query search results and per-source-id
/// alternate streams.
pub struct MockProvider {
    pub search_results: Mutex<Vec<Vec<Track>>>,
    pub alternates: Mutex<HashMap<String, ResolvedStream>>,
}

impl MockProvider {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            search_results: Mutex::new(Vec::new()),
            alternates: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_search_results(results: Vec<Vec<Track>>) -> Arc<Self> {
        Arc::new(Self {
            search_results: Mutex::new(results),
            alternates: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_alternate(source_id: &str, stream_url: &str) -> Arc<Self> {
        let mut alternates = HashMap::new();
        alternates.insert(
            source_id.to_string(),
            ResolvedStream {
                stream_url: stream_url.to_string(),
                artwork_url: None,
            },
        );
        Arc::new(Self {
            search_results: Mutex::new(Vec::new()),
            alternates: Mutex::new(alternates),
        })
    }
}

#[async_trait::async_trait]
impl StreamProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn lookup_alternate(&self, track: &Track) -> Result<Option<ResolvedStream>> {
        Ok(self
            .alternates
            .lock()
            .unwrap()
            .get(track.id.source_id())
            .cloned())
    }

    async fn search(&self, _query: &str) -> Result<Vec<Track>> {
        let mut results = self.search_results.lock().unwrap();
        if results.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(results.remove(0))
        }
    }
}
