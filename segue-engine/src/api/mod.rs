//! REST API for the playback engine
//!
//! Thin HTTP surface over the engine operations, plus an SSE stream that
//! re-broadcasts engine events to connected UIs.

pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::engine::PlayerEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Playback engine (cheap-clone handle)
    pub engine: PlayerEngine,
    /// Server port
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Playback control
                .route("/playback/load", post(handlers::load))
                .route("/playback/play", post(handlers::play))
                .route("/playback/pause", post(handlers::pause))
                .route("/playback/toggle", post(handlers::toggle))
                .route("/playback/next", post(handlers::next_track))
                .route("/playback/previous", post(handlers::previous_track))
                .route("/playback/seek", post(handlers::seek))
                .route("/playback/state", get(handlers::get_state))
                .route("/playback/shuffle", post(handlers::toggle_shuffle))
                .route("/playback/repeat", post(handlers::cycle_repeat))
                .route("/playback/crossfade", get(handlers::get_crossfade))
                .route("/playback/crossfade", post(handlers::set_crossfade))
                // Volume
                .route("/audio/volume", get(handlers::get_volume))
                .route("/audio/volume", post(handlers::set_volume))
                // Queue
                .route("/queue", get(handlers::get_queue))
                .route("/queue", post(handlers::enqueue))
                .route("/queue/clear", post(handlers::clear_queue))
                // Equalizer
                .route("/equalizer", get(handlers::get_equalizer))
                .route("/equalizer", post(handlers::set_equalizer_enabled))
                .route("/equalizer/band", post(handlers::set_equalizer_band))
                .route("/equalizer/preset", post(handlers::apply_equalizer_preset))
                // SSE events
                .route("/events", get(sse::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "segue-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}
