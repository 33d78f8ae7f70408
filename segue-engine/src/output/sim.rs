//! Simulated output handle
//!
//! Clock-driven stand-in for a real audio device: reports ready
//! immediately (or after a configured delay), advances position from a
//! monotonic clock while "playing," and lets tests inject failures,
//! durations, and end-of-track. Used by the engine integration tests and
//! by `--no-audio` runs.

use super::{AudioOutput, DeviceEvent, HandleId, OutputError};
use segue_common::model::EQ_BAND_COUNT;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

#[derive(Debug, Default)]
struct SimChain {
    built: bool,
    enabled: bool,
    gains: [f32; EQ_BAND_COUNT],
}

#[derive(Debug)]
struct SimInner {
    loaded: Option<HandleId>,
    loaded_url: Option<String>,
    playing: bool,
    /// Accumulated position excluding the currently running segment.
    position_base: f64,
    segment_start: Option<Instant>,
    duration: Option<f64>,
    gain: f32,
    chain: Option<(HandleId, SimChain)>,
}

impl SimInner {
    fn position(&self) -> f64 {
        let running = self
            .segment_start
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.position_base + running
    }
}

/// Deterministic output handle for tests and no-audio mode.
pub struct SimOutput {
    slot: usize,
    generation: AtomicU64,
    events: broadcast::Sender<DeviceEvent>,
    inner: Arc<Mutex<SimInner>>,
    /// Remaining loads that should report a device error instead of ready.
    fail_loads: AtomicUsize,
    /// Duration to report for subsequent loads (None = unknown).
    next_duration: Mutex<Option<f64>>,
    ready_delay: Mutex<Duration>,
    load_count: AtomicUsize,
    graph_builds: AtomicUsize,
}

impl SimOutput {
    pub fn new(slot: usize) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            slot,
            generation: AtomicU64::new(0),
            events,
            inner: Arc::new(Mutex::new(SimInner {
                loaded: None,
                loaded_url: None,
                playing: false,
                position_base: 0.0,
                segment_start: None,
                duration: None,
                gain: 1.0,
                chain: None,
            })),
            fail_loads: AtomicUsize::new(0),
            next_duration: Mutex::new(Some(300.0)),
            ready_delay: Mutex::new(Duration::ZERO),
            load_count: AtomicUsize::new(0),
            graph_builds: AtomicUsize::new(0),
        }
    }

    // --- test controls -------------------------------------------------

    /// The next `n` loads emit a device error instead of ready.
    pub fn fail_next_loads(&self, n: usize) {
        self.fail_loads.store(n, Ordering::SeqCst);
    }

    /// Duration reported for subsequent loads.
    pub fn set_next_duration(&self, secs: Option<f64>) {
        *self.next_duration.lock().unwrap() = secs;
    }

    /// Delay before the ready event fires (to exercise preload timeouts).
    pub fn set_ready_delay(&self, delay: Duration) {
        *self.ready_delay.lock().unwrap() = delay;
    }

    /// Jump the simulated clock forward.
    pub fn advance(&self, secs: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.position_base += secs;
    }

    /// Emit the natural-end event for the loaded source.
    pub fn emit_ended(&self) {
        let handle = self.handle_id();
        let mut inner = self.inner.lock().unwrap();
        inner.playing = false;
        inner.segment_start = None;
        drop(inner);
        let _ = self.events.send(DeviceEvent::Ended { handle });
    }

    pub fn loaded_url(&self) -> Option<String> {
        self.inner.lock().unwrap().loaded_url.clone()
    }

    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    /// Number of successful graph builds across all handles.
    pub fn graph_build_count(&self) -> usize {
        self.graph_builds.load(Ordering::SeqCst)
    }

    pub fn current_gain(&self) -> f32 {
        self.inner.lock().unwrap().gain
    }

    pub fn eq_enabled(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .chain
            .as_ref()
            .map(|(_, c)| c.built && c.enabled)
            .unwrap_or(false)
    }

    pub fn eq_gains(&self) -> Option<[f32; EQ_BAND_COUNT]> {
        self.inner
            .lock()
            .unwrap()
            .chain
            .as_ref()
            .filter(|(_, c)| c.built)
            .map(|(_, c)| c.gains)
    }
}

#[async_trait::async_trait]
impl super::AudioOutput for SimOutput {
    fn slot(&self) -> usize {
        self.slot
    }

    fn handle_id(&self) -> HandleId {
        HandleId {
            slot: self.slot,
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    async fn load(&self, url: &str) -> Result<HandleId, OutputError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = HandleId {
            slot: self.slot,
            generation,
        };
        self.load_count.fetch_add(1, Ordering::SeqCst);

        let duration = *self.next_duration.lock().unwrap();
        {
            let mut inner = self.inner.lock().unwrap();
            inner.loaded = Some(handle);
            inner.loaded_url = Some(url.to_string());
            inner.playing = false;
            inner.position_base = 0.0;
            inner.segment_start = None;
            inner.duration = duration;
            inner.chain = Some((handle, SimChain::default()));
        }

        let should_fail = self
            .fail_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let events = self.events.clone();
        let delay = *self.ready_delay.lock().unwrap();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let event = if should_fail {
                DeviceEvent::Error {
                    handle,
                    message: "simulated stream failure".into(),
                }
            } else {
                DeviceEvent::ReadyToPlay { handle }
            };
            let _ = events.send(event);
        });

        Ok(handle)
    }

    fn play(&self) -> Result<(), OutputError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.loaded.is_none() {
            return Err(OutputError::NotReady("no source loaded".into()));
        }
        if !inner.playing {
            inner.playing = true;
            inner.segment_start = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.playing {
            inner.position_base = inner.position();
            inner.playing = false;
            inner.segment_start = None;
        }
    }

    fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.loaded = None;
        inner.loaded_url = None;
        inner.playing = false;
        inner.position_base = 0.0;
        inner.segment_start = None;
        inner.duration = None;
        inner.chain = None;
    }

    fn set_gain(&self, gain: f32) {
        self.inner.lock().unwrap().gain = gain.clamp(0.0, 1.0);
    }

    fn seek(&self, position_secs: f64) -> Result<(), OutputError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.loaded.is_none() {
            return Err(OutputError::NotReady("no source loaded".into()));
        }
        inner.position_base = position_secs.max(0.0);
        if inner.playing {
            inner.segment_start = Some(Instant::now());
        }
        Ok(())
    }

    fn position_secs(&self) -> f64 {
        self.inner.lock().unwrap().position()
    }

    fn duration_secs(&self) -> Option<f64> {
        self.inner.lock().unwrap().duration
    }

    fn build_eq_graph(&self, bands: &[f32; EQ_BAND_COUNT]) -> Result<(), OutputError> {
        let current = self.handle_id();
        let mut inner = self.inner.lock().unwrap();
        let (handle, chain) = inner
            .chain
            .as_mut()
            .ok_or_else(|| OutputError::NotReady("no source loaded".into()))?;
        if *handle != current {
            return Err(OutputError::NotReady("source superseded".into()));
        }
        if chain.built {
            return Err(OutputError::GraphConflict);
        }
        chain.built = true;
        chain.gains = *bands;
        self.graph_builds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_eq_enabled(&self, enabled: bool) -> Result<(), OutputError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.chain.as_mut() {
            Some((_, chain)) if chain.built => {
                chain.enabled = enabled;
                Ok(())
            }
            _ => Err(OutputError::NotReady("graph not built".into())),
        }
    }

    fn set_eq_band(&self, index: usize, gain_db: f32) -> Result<(), OutputError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.chain.as_mut() {
            Some((_, chain)) if chain.built => {
                if index < EQ_BAND_COUNT {
                    chain.gains[index] = gain_db;
                }
                Ok(())
            }
            _ => Err(OutputError::NotReady("graph not built".into())),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::AudioOutput;

    #[tokio::test]
    async fn test_load_mints_fresh_handle_ids() {
        let out = SimOutput::new(0);
        let h1 = out.load("https://a.example.com/1.mp3").await.unwrap();
        let h2 = out.load("https://a.example.com/2.mp3").await.unwrap();
        assert_ne!(h1, h2);
        assert_eq!(out.handle_id(), h2);
    }

    #[tokio::test]
    async fn test_ready_event_fires() {
        let out = SimOutput::new(0);
        let mut rx = out.subscribe();
        let handle = out.load("https://a.example.com/1.mp3").await.unwrap();
        match rx.recv().await.unwrap() {
            DeviceEvent::ReadyToPlay { handle: h } => assert_eq!(h, handle),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_load_emits_error() {
        let out = SimOutput::new(0);
        out.fail_next_loads(1);
        let mut rx = out.subscribe();
        out.load("https://a.example.com/1.mp3").await.unwrap();
        match rx.recv().await.unwrap() {
            DeviceEvent::Error { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
        // Next load succeeds again
        out.load("https://a.example.com/2.mp3").await.unwrap();
        match rx.recv().await.unwrap() {
            DeviceEvent::ReadyToPlay { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_graph_build_once_per_handle() {
        let out = SimOutput::new(0);
        out.load("https://a.example.com/1.mp3").await.unwrap();
        out.build_eq_graph(&[0.0; EQ_BAND_COUNT]).unwrap();
        assert!(matches!(
            out.build_eq_graph(&[0.0; EQ_BAND_COUNT]),
            Err(OutputError::GraphConflict)
        ));

        // A new load produces a new handle, so the graph builds again.
        out.load("https://a.example.com/2.mp3").await.unwrap();
        out.build_eq_graph(&[0.0; EQ_BAND_COUNT]).unwrap();
        assert_eq!(out.graph_build_count(), 2);
    }

    #[tokio::test]
    async fn test_position_advances_only_while_playing() {
        let out = SimOutput::new(0);
        out.load("https://a.example.com/1.mp3").await.unwrap();
        assert_eq!(out.position_secs(), 0.0);
        out.advance(42.0);
        assert_eq!(out.position_secs(), 42.0);
        out.seek(10.0).unwrap();
        assert_eq!(out.position_secs(), 10.0);
    }
}
