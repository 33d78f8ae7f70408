//! # Segue Playback Engine
//!
//! Client-side playback engine for a multi-platform music aggregator.
//!
//! **Purpose:** own the audio output handles, keep a 10-band equalizer
//! graph attached to the live output, crossfade between tracks, resolve
//! alternate stream sources when URLs go bad, and keep the play queue
//! from starving via continuity search, all behind an HTTP/SSE control
//! interface.

pub mod api;
pub mod config;
pub mod continuity;
pub mod db;
pub mod engine;
pub mod equalizer;
pub mod error;
pub mod output;
pub mod queue;
pub mod resolver;
pub mod state;

pub use engine::PlayerEngine;
pub use error::{Error, Result};
pub use state::SharedState;
