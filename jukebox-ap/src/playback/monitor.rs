//! Background monitoring tasks for playback

use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::info;

use super::engine::PlaybackEngine;
use crate::state::SharedState;
use jukebox_common::JukeboxEvent;

/// Start the progress broadcast task
pub fn start_monitoring(engine: Arc<PlaybackEngine>, state: Arc<SharedState>) {
    tokio::spawn(progress_task(engine, state));
}

/// Emits a PlaybackProgress event every second while something is audible
async fn progress_task(engine: Arc<PlaybackEngine>, state: Arc<SharedState>) {
    let mut interval = time::interval(Duration::from_millis(1000));

    info!("Progress task started (1000ms interval)");

    loop {
        interval.tick().await;

        if !engine.is_playing() {
            continue;
        }
        let Some(track_id) = engine.current_track_id().await else {
            continue;
        };

        let position_ms = (engine.current_time().await * 1000.0) as u64;
        let duration_ms = engine.duration().await.map(|secs| (secs * 1000.0) as u64);

        state.broadcast_event(JukeboxEvent::PlaybackProgress {
            track_id,
            position_ms,
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
    }
}
