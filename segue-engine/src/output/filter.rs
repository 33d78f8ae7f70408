//! Equalizer filter chain for the rodio backend
//!
//! Ten cascaded peaking biquad stages (RBJ cookbook coefficients) applied
//! to interleaved samples inside a [`rodio::Source`] wrapper. Band gains
//! live in [`EqChainHandle`], shared between the audio thread and the
//! control side; the source picks up changes via a version counter so the
//! hot path never takes the lock unless something changed.

use segue_common::model::{EQ_BAND_COUNT, EQ_BAND_FREQUENCIES};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::Source;

/// Q factor for the octave-spaced peaking stages.
const BAND_Q: f32 = 1.41;

/// Band gains below this magnitude are treated as flat and bypassed.
const FLAT_EPSILON: f32 = 0.01;

/// Control-side handle to a filter chain.
///
/// Cheap to clone; the audio-thread source holds the same allocation.
#[derive(Clone)]
pub struct EqChainHandle {
    inner: Arc<EqChainShared>,
}

struct EqChainShared {
    enabled: AtomicBool,
    version: AtomicU64,
    gains_db: Mutex<[f32; EQ_BAND_COUNT]>,
}

impl EqChainHandle {
    pub fn new(gains_db: [f32; EQ_BAND_COUNT], enabled: bool) -> Self {
        Self {
            inner: Arc::new(EqChainShared {
                enabled: AtomicBool::new(enabled),
                version: AtomicU64::new(1),
                gains_db: Mutex::new(gains_db),
            }),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
        self.inner.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_gain(&self, index: usize, gain_db: f32) {
        if index >= EQ_BAND_COUNT {
            return;
        }
        {
            let mut gains = self.inner.gains_db.lock().unwrap();
            gains[index] = gain_db;
        }
        self.inner.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_gains(&self, gains_db: [f32; EQ_BAND_COUNT]) {
        {
            let mut gains = self.inner.gains_db.lock().unwrap();
            *gains = gains_db;
        }
        self.inner.version.fetch_add(1, Ordering::AcqRel);
    }

    fn snapshot(&self) -> (u64, bool, [f32; EQ_BAND_COUNT]) {
        let version = self.inner.version.load(Ordering::Acquire);
        let enabled = self.inner.enabled.load(Ordering::Acquire);
        let gains = *self.inner.gains_db.lock().unwrap();
        (version, enabled, gains)
    }

    fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }
}

/// Normalized peaking-filter coefficients for one stage.
#[derive(Debug, Clone, Copy)]
struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    active: bool,
}

impl BiquadCoeffs {
    const FLAT: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
        active: false,
    };

    /// RBJ cookbook peaking EQ.
    fn peaking(f0: f32, fs: f32, gain_db: f32) -> Self {
        if gain_db.abs() < FLAT_EPSILON || f0 >= fs / 2.0 {
            return Self::FLAT;
        }
        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * f0 / fs;
        let alpha = w0.sin() / (2.0 * BAND_Q);
        let cos_w0 = w0.cos();

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            active: true,
        }
    }
}

/// Direct-form-I state for one stage on one channel.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, c: &BiquadCoeffs, x: f32) -> f32 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// A source wrapper applying the filter chain to every sample.
pub struct EqSource<S> {
    inner: S,
    handle: EqChainHandle,
    coeffs: [BiquadCoeffs; EQ_BAND_COUNT],
    states: Vec<[BiquadState; EQ_BAND_COUNT]>,
    enabled: bool,
    seen_version: u64,
    next_channel: usize,
}

impl<S> EqSource<S>
where
    S: Source<Item = f32>,
{
    pub fn new(inner: S, handle: EqChainHandle) -> Self {
        let channels = inner.channels().max(1) as usize;
        let mut source = Self {
            inner,
            handle,
            coeffs: [BiquadCoeffs::FLAT; EQ_BAND_COUNT],
            states: vec![[BiquadState::default(); EQ_BAND_COUNT]; channels],
            enabled: false,
            seen_version: 0,
            next_channel: 0,
        };
        source.refresh();
        source
    }

    fn refresh(&mut self) {
        let (version, enabled, gains) = self.handle.snapshot();
        let fs = self.inner.sample_rate() as f32;
        for (i, gain) in gains.iter().enumerate() {
            self.coeffs[i] = BiquadCoeffs::peaking(EQ_BAND_FREQUENCIES[i], fs, *gain);
        }
        self.enabled = enabled;
        self.seen_version = version;
    }

    fn reset_states(&mut self) {
        for channel in &mut self.states {
            *channel = [BiquadState::default(); EQ_BAND_COUNT];
        }
    }
}

impl<S> Iterator for EqSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    #[inline]
    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;

        if self.next_channel == 0 && self.handle.version() != self.seen_version {
            self.refresh();
        }

        let channels = self.states.len();
        let channel = self.next_channel;
        self.next_channel = (self.next_channel + 1) % channels;

        if !self.enabled {
            return Some(sample);
        }

        let mut out = sample;
        let states = &mut self.states[channel];
        for (coeffs, state) in self.coeffs.iter().zip(states.iter_mut()) {
            if coeffs.active {
                out = state.process(coeffs, out);
            }
        }
        Some(out)
    }
}

impl<S> Source for EqSource<S>
where
    S: Source<Item = f32>,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> rodio::ChannelCount {
        self.inner.channels()
    }

    fn sample_rate(&self) -> rodio::SampleRate {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), rodio::source::SeekError> {
        // Filter memory refers to the old position; clear it.
        self.reset_states();
        self.inner.try_seek(pos)
    }
}
