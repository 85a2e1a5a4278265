//! Audio output channels
//!
//! The engine owns exactly two interchangeable channels and ping-pongs
//! between them: at any moment one is "current" (audible, transport
//! controlled) and the other is "next" (silent or fading in, used for
//! preloading). A channel is an opaque native streaming element: it fetches
//! and decodes its source itself, and the engine only stages gain and
//! transport on it.

pub mod rodio;

use tokio::sync::broadcast;

pub use self::rodio::RodioChannel;

/// Events emitted by a channel toward the engine
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The stream's own metadata arrived and exposed a duration
    MetadataLoaded { duration_secs: f64 },

    /// The channel played its source to the end
    Ended,

    /// Stream fetch or decode failure; no automatic retry is performed
    Error { message: String },
}

/// One audio output slot
///
/// Implementations must be cheap to control: all methods are non-blocking
/// fire-and-forget calls, with loading and end-of-stream reported
/// asynchronously through the event stream.
pub trait AudioChannel: Send + Sync {
    /// Assign a stream URL and begin loading it. Replaces any prior source.
    fn set_source(&self, url: &str);

    /// Stop and drop the current source, resetting position to zero
    fn clear(&self);

    fn play(&self);

    fn pause(&self);

    /// Jump to a position in seconds within the current source
    fn seek(&self, position_secs: f64);

    /// Set the element volume (0.0-1.0)
    fn set_volume(&self, volume: f32);

    /// Current playback position in seconds
    fn position_secs(&self) -> f64;

    /// Duration of the loaded source, once metadata discovered it
    fn duration_secs(&self) -> Option<f64>;

    /// True when a source is loaded and not paused
    fn is_playing(&self) -> bool;

    /// URL of the currently assigned source, if any
    fn source_url(&self) -> Option<String>;

    /// Subscribe to this channel's event stream
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}
