//! rodio-backed output handle
//!
//! A dedicated worker thread owns the `rodio::OutputStream` and the live
//! `Sink`; the facade talks to it over a command channel and publishes
//! device events over a broadcast channel. Remote sources are streamed
//! through `stream-download`, which hands the decoder a `Read + Seek`
//! view of the HTTP body with prefetch.

use super::filter::{EqChainHandle, EqSource};
use super::{DeviceEvent, HandleId, OutputError};
use segue_common::model::EQ_BAND_COUNT;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use rodio::{Decoder, OutputStreamBuilder, Sink, Source};
use stream_download::storage::temp::TempStorageProvider;
use stream_download::{Settings, StreamDownload};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How often the worker polls sink position / end-of-source.
const WORKER_POLL: Duration = Duration::from_millis(200);

type HttpReader = StreamDownload<TempStorageProvider>;

enum WorkerCmd {
    Load { handle: HandleId, reader: HttpReader },
    Play,
    Pause,
    Stop,
    SetGain(f32),
    Seek(f64),
}

/// Cross-thread position/duration/chain state.
struct DeviceShared {
    /// f64 bits; position of the loaded source in seconds.
    position_bits: AtomicU64,
    /// f64 bits; NaN encodes "unknown".
    duration_bits: AtomicU64,
    chain: Mutex<Option<ChainSlot>>,
}

struct ChainSlot {
    handle: HandleId,
    chain: EqChainHandle,
    built: bool,
}

impl DeviceShared {
    fn new() -> Self {
        Self {
            position_bits: AtomicU64::new(0f64.to_bits()),
            duration_bits: AtomicU64::new(f64::NAN.to_bits()),
            chain: Mutex::new(None),
        }
    }

    fn set_position(&self, secs: f64) {
        self.position_bits.store(secs.to_bits(), Ordering::Release);
    }

    fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Acquire))
    }

    fn set_duration(&self, secs: Option<f64>) {
        let bits = secs.unwrap_or(f64::NAN).to_bits();
        self.duration_bits.store(bits, Ordering::Release);
    }

    fn duration(&self) -> Option<f64> {
        let value = f64::from_bits(self.duration_bits.load(Ordering::Acquire));
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }
}

/// Real audio output handle over rodio.
pub struct RodioOutput {
    slot: usize,
    generation: AtomicU64,
    events: broadcast::Sender<DeviceEvent>,
    cmd_tx: mpsc::Sender<WorkerCmd>,
    shared: Arc<DeviceShared>,
}

impl RodioOutput {
    /// Spawn the worker thread for one output slot.
    pub fn new(slot: usize) -> Self {
        let (events, _) = broadcast::channel(32);
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let shared = Arc::new(DeviceShared::new());

        let worker_events = events.clone();
        let worker_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("segue-output-{slot}"))
            .spawn(move || worker_loop(cmd_rx, worker_events, worker_shared))
            .expect("failed to spawn audio output thread");

        Self {
            slot,
            generation: AtomicU64::new(0),
            events,
            cmd_tx,
            shared,
        }
    }

    fn send(&self, cmd: WorkerCmd) -> Result<(), OutputError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| OutputError::NotReady("output worker stopped".into()))
    }
}

#[async_trait::async_trait]
impl super::AudioOutput for RodioOutput {
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

        self.shared.set_position(0.0);
        self.shared.set_duration(None);

        let parsed: url::Url = url
            .parse()
            .map_err(|e| OutputError::Stream(format!("unparseable stream URL: {e}")))?;

        let reader = StreamDownload::new_http(
            parsed,
            TempStorageProvider::default(),
            Settings::default(),
        )
        .await
        .map_err(|e| OutputError::Stream(format!("stream setup failed: {e}")))?;

        // A newer load may have started while the stream was being set up;
        // its results win.
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(OutputError::Aborted("superseded by a newer load".into()));
        }

        self.send(WorkerCmd::Load { handle, reader })?;
        Ok(handle)
    }

    fn play(&self) -> Result<(), OutputError> {
        self.send(WorkerCmd::Play)
    }

    fn pause(&self) {
        let _ = self.send(WorkerCmd::Pause);
    }

    fn stop(&self) {
        let _ = self.send(WorkerCmd::Stop);
        *self.shared.chain.lock().unwrap() = None;
    }

    fn set_gain(&self, gain: f32) {
        let _ = self.send(WorkerCmd::SetGain(gain.clamp(0.0, 1.0)));
    }

    fn seek(&self, position_secs: f64) -> Result<(), OutputError> {
        self.shared.set_position(position_secs.max(0.0));
        self.send(WorkerCmd::Seek(position_secs.max(0.0)))
    }

    fn position_secs(&self) -> f64 {
        self.shared.position()
    }

    fn duration_secs(&self) -> Option<f64> {
        self.shared.duration()
    }

    fn build_eq_graph(&self, bands: &[f32; EQ_BAND_COUNT]) -> Result<(), OutputError> {
        let mut guard = self.shared.chain.lock().unwrap();
        let slot = guard
            .as_mut()
            .ok_or_else(|| OutputError::NotReady("no source loaded".into()))?;
        if slot.handle != self.handle_id() {
            return Err(OutputError::NotReady("source superseded".into()));
        }
        if slot.built {
            return Err(OutputError::GraphConflict);
        }
        slot.chain.set_gains(*bands);
        slot.built = true;
        Ok(())
    }

    fn set_eq_enabled(&self, enabled: bool) -> Result<(), OutputError> {
        let guard = self.shared.chain.lock().unwrap();
        match guard.as_ref() {
            Some(slot) if slot.built => {
                slot.chain.set_enabled(enabled);
                Ok(())
            }
            _ => Err(OutputError::NotReady("graph not built".into())),
        }
    }

    fn set_eq_band(&self, index: usize, gain_db: f32) -> Result<(), OutputError> {
        let guard = self.shared.chain.lock().unwrap();
        match guard.as_ref() {
            Some(slot) if slot.built => {
                slot.chain.set_gain(index, gain_db);
                Ok(())
            }
            _ => Err(OutputError::NotReady("graph not built".into())),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }
}

fn worker_loop(
    cmd_rx: mpsc::Receiver<WorkerCmd>,
    events: broadcast::Sender<DeviceEvent>,
    shared: Arc<DeviceShared>,
) {
    let stream = match OutputStreamBuilder::open_default_stream() {
        Ok(mut stream) => {
            // rodio logs on drop; noisy for a long-lived service.
            stream.log_on_drop(false);
            Some(stream)
        }
        Err(e) => {
            warn!("no audio output device available: {e}");
            None
        }
    };

    let mut sink: Option<Sink> = None;
    let mut current: Option<HandleId> = None;
    let mut gain: f32 = 1.0;
    let mut playing = false;
    let mut ended_emitted = false;

    loop {
        match cmd_rx.recv_timeout(WORKER_POLL) {
            Ok(WorkerCmd::Load { handle, reader }) => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
                playing = false;
                ended_emitted = false;
                shared.set_position(0.0);

                let Some(stream) = stream.as_ref() else {
                    let _ = events.send(DeviceEvent::Error {
                        handle,
                        message: "no audio output device".into(),
                    });
                    continue;
                };

                let decoder = match Decoder::new(reader) {
                    Ok(d) => d,
                    Err(e) => {
                        let _ = events.send(DeviceEvent::Error {
                            handle,
                            message: format!("decode failed: {e}"),
                        });
                        continue;
                    }
                };
                shared.set_duration(decoder.total_duration().map(|d| d.as_secs_f64()));

                let chain = EqChainHandle::new([0.0; EQ_BAND_COUNT], false);
                let source = EqSource::new(decoder, chain.clone());

                let new_sink = Sink::connect_new(stream.mixer());
                new_sink.pause();
                new_sink.set_volume(gain);
                new_sink.append(source);

                *shared.chain.lock().unwrap() = Some(ChainSlot {
                    handle,
                    chain,
                    built: false,
                });

                sink = Some(new_sink);
                current = Some(handle);
                debug!(slot = handle.slot, generation = handle.generation, "source loaded");
                let _ = events.send(DeviceEvent::ReadyToPlay { handle });
            }
            Ok(WorkerCmd::Play) => {
                if let Some(sink) = sink.as_ref() {
                    sink.play();
                    playing = true;
                }
            }
            Ok(WorkerCmd::Pause) => {
                if let Some(sink) = sink.as_ref() {
                    sink.pause();
                    playing = false;
                }
            }
            Ok(WorkerCmd::Stop) => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
                playing = false;
                current = None;
                shared.set_position(0.0);
                shared.set_duration(None);
            }
            Ok(WorkerCmd::SetGain(new_gain)) => {
                gain = new_gain;
                if let Some(sink) = sink.as_ref() {
                    sink.set_volume(gain);
                }
            }
            Ok(WorkerCmd::Seek(secs)) => {
                if let Some(sink) = sink.as_ref() {
                    if let Err(e) = sink.try_seek(Duration::from_secs_f64(secs)) {
                        // Seek on a still-buffering stream can fail; benign.
                        debug!("seek to {secs:.1}s failed: {e}");
                    } else {
                        shared.set_position(secs);
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let (Some(sink), Some(handle)) = (sink.as_ref(), current) {
                    shared.set_position(sink.get_pos().as_secs_f64());
                    if playing && sink.empty() && !ended_emitted {
                        ended_emitted = true;
                        playing = false;
                        let _ = events.send(DeviceEvent::Ended { handle });
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
