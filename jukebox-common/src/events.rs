//! Event types for the jukebox event system

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport state of the playback engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

/// Jukebox event types
///
/// Broadcast by the playback engine and streamed to UI clients over SSE.
/// The two transition events carry opposite contracts: `TrackEnded` means
/// the engine performed no transition and the collaborator must decide what
/// plays next; `TransitionComplete` means the engine already advanced and
/// the collaborator should only refresh its view, never trigger another
/// skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JukeboxEvent {
    /// Playback state changed
    PlaybackStateChanged {
        state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track was assigned to the current channel and began streaming
    TrackLoaded {
        track_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current track ended and no internal transition occurred
    TrackEnded {
        track_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A crossfade ramp started between two channels
    CrossfadeStarted {
        from_track_id: Uuid,
        to_track_id: Uuid,
        duration_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A crossfade or gapless switch completed; the engine already advanced
    TransitionComplete {
        track_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Master volume changed (0-100)
    VolumeChanged {
        volume: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback position update (sent every 1s during playback)
    PlaybackProgress {
        track_id: Uuid,
        position_ms: u64,
        duration_ms: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl JukeboxEvent {
    /// Event type string used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            JukeboxEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            JukeboxEvent::TrackLoaded { .. } => "TrackLoaded",
            JukeboxEvent::TrackEnded { .. } => "TrackEnded",
            JukeboxEvent::CrossfadeStarted { .. } => "CrossfadeStarted",
            JukeboxEvent::TransitionComplete { .. } => "TransitionComplete",
            JukeboxEvent::VolumeChanged { .. } => "VolumeChanged",
            JukeboxEvent::PlaybackProgress { .. } => "PlaybackProgress",
        }
    }
}
