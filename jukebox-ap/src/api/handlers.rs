//! Transport control handlers

use super::AppContext;
use crate::db::settings;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

/// Load request body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadRequest {
    /// Track to assign to the current channel
    pub track_id: Uuid,

    /// ReplayGain value for the track, in dB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaygain_db: Option<f64>,

    /// Collection context used for transition decisions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Known duration, used until stream metadata arrives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hint_ms: Option<u64>,
}

/// Seek request body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeekRequest {
    /// Position in milliseconds
    pub position_ms: u64,
}

/// Volume control request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VolumeRequest {
    /// Volume level (0-100)
    pub volume: i32,
}

/// Crossfade length request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrossfadeRequest {
    /// Fade length in seconds (0-12); 0 disables crossfade
    pub seconds: f64,
}

/// Current transport state
#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    pub track_id: Option<Uuid>,
    pub playing: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub volume: u8,
    pub crossfade_seconds: f64,
}

type HandlerError = (StatusCode, Json<Value>);

fn internal_error(e: impl std::fmt::Display) -> HandlerError {
    error!("Request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

/// POST /playback/load
pub async fn load_track(
    State(ctx): State<AppContext>,
    Json(request): Json<LoadRequest>,
) -> Json<Value> {
    ctx.engine
        .load_track(
            request.track_id,
            request.replaygain_db,
            request.collection,
            request.duration_hint_ms,
        )
        .await;
    Json(json!({ "message": "Track loaded" }))
}

/// POST /playback/play
pub async fn play(State(ctx): State<AppContext>) -> Json<Value> {
    ctx.engine.play().await;
    Json(json!({ "message": "Playback started" }))
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> Json<Value> {
    ctx.engine.pause().await;
    Json(json!({ "message": "Playback paused" }))
}

/// POST /playback/stop
pub async fn stop(State(ctx): State<AppContext>) -> Json<Value> {
    ctx.engine.stop().await;
    Json(json!({ "message": "Playback stopped" }))
}

/// POST /playback/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(request): Json<SeekRequest>,
) -> Json<Value> {
    let position_secs = request.position_ms as f64 / 1000.0;
    ctx.engine.seek(position_secs).await;
    Json(json!({ "message": "Position updated", "position_ms": request.position_ms }))
}

/// GET /playback/state
pub async fn get_state(State(ctx): State<AppContext>) -> Json<StateResponse> {
    let engine = &ctx.engine;
    Json(StateResponse {
        track_id: engine.current_track_id().await,
        playing: engine.is_playing(),
        position_ms: (engine.current_time().await * 1000.0) as u64,
        duration_ms: engine.duration().await.map(|secs| (secs * 1000.0) as u64),
        volume: engine.base_volume().await,
        crossfade_seconds: engine.crossfade_secs().await,
    })
}

/// GET /audio/volume
pub async fn get_volume(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({ "volume": ctx.engine.base_volume().await }))
}

/// POST /audio/volume
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(request): Json<VolumeRequest>,
) -> Result<Json<Value>, HandlerError> {
    let volume = request.volume.clamp(0, 100) as u8;
    settings::set_volume(&ctx.db_pool, volume)
        .await
        .map_err(internal_error)?;
    ctx.engine.set_volume(volume).await;
    Ok(Json(json!({ "message": "Volume updated", "volume": volume })))
}

/// GET /playback/crossfade
pub async fn get_crossfade(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({ "seconds": ctx.engine.crossfade_secs().await }))
}

/// POST /playback/crossfade
pub async fn set_crossfade(
    State(ctx): State<AppContext>,
    Json(request): Json<CrossfadeRequest>,
) -> Result<Json<Value>, HandlerError> {
    settings::set_crossfade_seconds(&ctx.db_pool, request.seconds)
        .await
        .map_err(internal_error)?;
    ctx.engine.set_crossfade_secs(request.seconds).await;
    let seconds = ctx.engine.crossfade_secs().await;
    Ok(Json(json!({ "message": "Crossfade updated", "seconds": seconds })))
}
