//! API request/response types and handlers

use super::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use segue_common::model::{EqualizerState, RepeatMode, Track, EQ_BAND_COUNT};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Load request body
#[derive(Debug, Clone, Deserialize)]
pub struct LoadRequest {
    pub track: Track,
    /// Start playing once ready (default true)
    #[serde(default = "default_auto_play")]
    pub auto_play: bool,
}

fn default_auto_play() -> bool {
    true
}

/// Seek request: normalized position in [0, 1]
#[derive(Debug, Clone, Deserialize)]
pub struct SeekRequest {
    pub position: f64,
}

/// Volume request: linear volume in [0, 1]
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeRequest {
    pub volume: f32,
}

/// Crossfade duration request (seconds; 0 disables)
#[derive(Debug, Clone, Deserialize)]
pub struct CrossfadeRequest {
    pub seconds: f64,
}

/// Equalizer enable request
#[derive(Debug, Clone, Deserialize)]
pub struct EqualizerEnabledRequest {
    pub enabled: bool,
}

/// Equalizer single-band request
#[derive(Debug, Clone, Deserialize)]
pub struct EqualizerBandRequest {
    pub index: usize,
    pub gain: f32,
}

/// Equalizer preset request (exactly 10 gains)
#[derive(Debug, Clone, Deserialize)]
pub struct EqualizerPresetRequest {
    pub bands: [f32; EQ_BAND_COUNT],
}

/// Queue contents response
#[derive(Debug, Clone, Serialize)]
pub struct QueueResponse {
    pub upcoming: Vec<Track>,
    pub history: Vec<Track>,
}

pub async fn load(
    State(state): State<AppState>,
    Json(request): Json<LoadRequest>,
) -> StatusCode {
    state.engine.load(request.track, request.auto_play).await;
    StatusCode::ACCEPTED
}

pub async fn play(State(state): State<AppState>) -> StatusCode {
    state.engine.play().await;
    StatusCode::NO_CONTENT
}

pub async fn pause(State(state): State<AppState>) -> StatusCode {
    state.engine.pause().await;
    StatusCode::NO_CONTENT
}

pub async fn toggle(State(state): State<AppState>) -> StatusCode {
    state.engine.toggle().await;
    StatusCode::NO_CONTENT
}

pub async fn next_track(State(state): State<AppState>) -> StatusCode {
    state.engine.next_track().await;
    StatusCode::NO_CONTENT
}

pub async fn previous_track(State(state): State<AppState>) -> StatusCode {
    state.engine.previous_track().await;
    StatusCode::NO_CONTENT
}

pub async fn seek(
    State(state): State<AppState>,
    Json(request): Json<SeekRequest>,
) -> StatusCode {
    state.engine.seek(request.position).await;
    StatusCode::NO_CONTENT
}

pub async fn get_state(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.engine.state().snapshot().await;
    Json(json!(snapshot))
}

pub async fn toggle_shuffle(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.engine.toggle_shuffle().await;
    Json(json!({ "shuffle": state.engine.state().shuffle().await }))
}

pub async fn cycle_repeat(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mode: RepeatMode = state.engine.cycle_repeat_mode().await;
    Json(json!({ "repeat_mode": mode }))
}

pub async fn get_crossfade(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "seconds": state.engine.crossfade_seconds().await }))
}

pub async fn set_crossfade(
    State(state): State<AppState>,
    Json(request): Json<CrossfadeRequest>,
) -> StatusCode {
    state.engine.set_crossfade_seconds(request.seconds).await;
    StatusCode::NO_CONTENT
}

pub async fn get_volume(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "volume": state.engine.state().volume().await }))
}

pub async fn set_volume(
    State(state): State<AppState>,
    Json(request): Json<VolumeRequest>,
) -> StatusCode {
    state.engine.set_volume(request.volume).await;
    StatusCode::NO_CONTENT
}

pub async fn get_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    let queue = state.engine.queue_handle().read().await;
    Json(QueueResponse {
        upcoming: queue.upcoming().to_vec(),
        history: queue.history().cloned().collect(),
    })
}

pub async fn enqueue(
    State(state): State<AppState>,
    Json(track): Json<Track>,
) -> StatusCode {
    state.engine.enqueue(track).await;
    StatusCode::CREATED
}

pub async fn clear_queue(State(state): State<AppState>) -> StatusCode {
    state.engine.clear_queue().await;
    StatusCode::NO_CONTENT
}

pub async fn get_equalizer(State(state): State<AppState>) -> Json<EqualizerState> {
    Json(state.engine.eq_state().await)
}

pub async fn set_equalizer_enabled(
    State(state): State<AppState>,
    Json(request): Json<EqualizerEnabledRequest>,
) -> StatusCode {
    state.engine.set_eq_enabled(request.enabled).await;
    StatusCode::NO_CONTENT
}

pub async fn set_equalizer_band(
    State(state): State<AppState>,
    Json(request): Json<EqualizerBandRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if request.index >= EQ_BAND_COUNT {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("band index {} out of range 0-9", request.index),
        ));
    }
    state
        .engine
        .set_eq_band(request.index, request.gain)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn apply_equalizer_preset(
    State(state): State<AppState>,
    Json(request): Json<EqualizerPresetRequest>,
) -> StatusCode {
    state.engine.apply_eq_preset(request.bands).await;
    StatusCode::NO_CONTENT
}
