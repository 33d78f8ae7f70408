//! Equalizer graph management
//!
//! Owns the persisted [`EqualizerState`] and the per-handle graph
//! bookkeeping. An output handle accepts exactly one graph build per
//! loaded source; a second attempt reports a conflict which is treated
//! here as "already connected". Because a crossfade swap makes a
//! different slot primary (with its own handle id), the chain is rebuilt
//! from scratch on every swap rather than reparented; the old chain's
//! nodes die with the old handle.
//!
//! Failure semantics: when the graph cannot be built (no source loaded
//! yet, handle superseded mid-call) the mutation degrades to "state
//! updated, audio unaffected"; the equalizer becomes fully effective on
//! the next successful build, typically the next track load.

use crate::db;
use crate::error::Result;
use crate::output::{AudioOutput, HandleId, OutputError};
use segue_common::model::{EqualizerState, EQ_BAND_COUNT};
use sqlx::SqlitePool;
use std::sync::Mutex as StdMutex;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Equalizer state plus per-slot build tracking.
pub struct EqualizerGraph {
    state: RwLock<EqualizerState>,
    /// Which handle incarnation each slot's graph was built for.
    /// Arena-indexed: slot 0 / slot 1.
    built: StdMutex<[Option<HandleId>; 2]>,
    db: SqlitePool,
}

impl EqualizerGraph {
    pub fn new(db: SqlitePool, initial: EqualizerState) -> Self {
        Self {
            state: RwLock::new(initial),
            built: StdMutex::new([None, None]),
            db,
        }
    }

    pub async fn state(&self) -> EqualizerState {
        self.state.read().await.clone()
    }

    pub async fn bands(&self) -> [f32; EQ_BAND_COUNT] {
        self.state.read().await.bands
    }

    pub async fn set_enabled(&self, enabled: bool, primary: &dyn AudioOutput) -> Result<()> {
        let state = {
            let mut state = self.state.write().await;
            state.enabled = enabled;
            state.clone()
        };
        self.apply_live(&state, primary);
        self.persist(&state).await;
        Ok(())
    }

    pub async fn set_band(&self, index: usize, gain: f32, primary: &dyn AudioOutput) -> Result<()> {
        let state = {
            let mut state = self.state.write().await;
            state.set_band(index, gain);
            state.clone()
        };
        self.apply_live(&state, primary);
        self.persist(&state).await;
        Ok(())
    }

    pub async fn apply_preset(
        &self,
        bands: [f32; EQ_BAND_COUNT],
        primary: &dyn AudioOutput,
    ) -> Result<()> {
        let state = {
            let mut state = self.state.write().await;
            state.apply_preset(bands);
            state.clone()
        };
        self.apply_live(&state, primary);
        self.persist(&state).await;
        Ok(())
    }

    /// (Re)attach the graph to the given primary handle, e.g. after a
    /// crossfade swap or a fresh load. Lazy: builds only when the slot's
    /// recorded handle is stale.
    pub async fn activate(&self, primary: &dyn AudioOutput) {
        let state = self.state.read().await.clone();
        self.apply_live(&state, primary);
    }

    /// Drop build tracking for a slot whose handle was torn down.
    pub fn retire_slot(&self, slot: usize) {
        if let Some(entry) = self.built.lock().unwrap().get_mut(slot) {
            *entry = None;
        }
    }

    fn apply_live(&self, state: &EqualizerState, primary: &dyn AudioOutput) {
        if !self.ensure_built(state, primary) {
            return;
        }
        // Gains always track state so a later enable is instantaneous;
        // the enable flag gates audibility.
        for (i, gain) in state.bands.iter().enumerate() {
            if let Err(e) = primary.set_eq_band(i, *gain) {
                debug!("equalizer band {i} not applied: {e}");
                return;
            }
        }
        if let Err(e) = primary.set_eq_enabled(state.enabled) {
            debug!("equalizer enable not applied: {e}");
        }
    }

    /// Build the graph for the primary handle if its slot has not been
    /// built for the current handle incarnation. Returns whether a built
    /// graph is in place.
    fn ensure_built(&self, state: &EqualizerState, primary: &dyn AudioOutput) -> bool {
        let slot = primary.slot();
        let handle = primary.handle_id();
        let mut built = self.built.lock().unwrap();
        let Some(entry) = built.get_mut(slot) else {
            warn!("equalizer asked to build on unknown slot {slot}");
            return false;
        };
        if *entry == Some(handle) {
            return true;
        }
        match primary.build_eq_graph(&state.bands) {
            Ok(()) => {
                *entry = Some(handle);
                debug!(slot, generation = handle.generation, "equalizer graph built");
                true
            }
            Err(OutputError::GraphConflict) => {
                // Already connected for this handle; adopt it.
                *entry = Some(handle);
                true
            }
            Err(e) => {
                // State stays updated, audio unaffected until next build.
                debug!("equalizer graph build deferred: {e}");
                false
            }
        }
    }

    async fn persist(&self, state: &EqualizerState) {
        if let Err(e) = db::settings::set_equalizer(&self.db, state).await {
            warn!("failed to persist equalizer settings: {e}");
        }
    }
}
