//! Shared event bus
//!
//! Thread-safe broadcast channel connecting the playback engine to SSE
//! clients. Rare writers, many readers; send errors (no receivers) are
//! ignored.

use jukebox_common::JukeboxEvent;
use tokio::sync::broadcast;

/// Shared state accessible by all components
pub struct SharedState {
    /// Event broadcaster for SSE events
    event_tx: broadcast::Sender<JukeboxEvent>,
}

impl SharedState {
    /// Create new shared state
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100); // Buffer up to 100 events
        Self { event_tx }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: JukeboxEvent) {
        // No receivers is OK
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to the event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<JukeboxEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
