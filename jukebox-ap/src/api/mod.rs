//! REST API and SSE surface for the playback engine
//!
//! The UI drives transport exclusively through these endpoints and
//! observes playback through the event stream; it never reaches into the
//! channels themselves.

pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::playback::PlaybackEngine;
use crate::state::SharedState;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<PlaybackEngine>,
    pub state: Arc<SharedState>,
    pub db_pool: Pool<Sqlite>,
    pub port: u16,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(health))
        // Playback control
        .route("/playback/load", post(handlers::load_track))
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/stop", post(handlers::stop))
        .route("/playback/seek", post(handlers::seek))
        .route("/playback/state", get(handlers::get_state))
        .route(
            "/playback/crossfade",
            get(handlers::get_crossfade).post(handlers::set_crossfade),
        )
        // Volume
        .route(
            "/audio/volume",
            get(handlers::get_volume).post(handlers::set_volume),
        )
        // SSE events
        .route("/events", get(sse::event_stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Health check endpoint
async fn health(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "jukebox-ap",
        "version": env!("CARGO_PKG_VERSION"),
        "port": ctx.port,
    }))
}
