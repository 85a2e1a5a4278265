//! Rodio-backed audio channel
//!
//! The native streaming element: each channel wraps a `rodio::Sink` fed by
//! an HTTP fetch of the track's stream URL. Decoding happens inside rodio;
//! this module never touches samples. The `OutputStream` is not `Send`, so
//! a dedicated `audio-output` thread owns it for the life of the process
//! and only the (Send + Sync) sinks cross into async context.
//!
//! Loading is asynchronous: `set_source` bumps a generation counter and
//! spawns the fetch; a response that arrives after the channel was cleared
//! or re-targeted is discarded by generation comparison. Duration is
//! reported through `MetadataLoaded` when the container exposes it, and an
//! end-watcher emits `Ended` exactly once per generation.

use super::{AudioChannel, ChannelEvent};
use crate::error::{Error, Result};
use rodio::{Decoder, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How often the end-watcher polls the sink for completion
const END_POLL_MS: u64 = 250;

#[derive(Default)]
struct Shared {
    source_url: Option<String>,
    duration_secs: Option<f64>,
}

/// One rodio-backed output channel
pub struct RodioChannel {
    sink: Arc<Sink>,
    http: reqwest::Client,
    shared: Arc<Mutex<Shared>>,
    generation: Arc<AtomicU64>,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl RodioChannel {
    fn new(sink: Sink, http: reqwest::Client) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            sink: Arc::new(sink),
            http,
            shared: Arc::new(Mutex::new(Shared::default())),
            generation: Arc::new(AtomicU64::new(0)),
            event_tx,
        }
    }

    /// Open the default audio output and build the channel pair
    ///
    /// Spawns the `audio-output` thread that owns the `OutputStream` and
    /// keeps it alive for the process lifetime.
    pub fn spawn_pair(http: reqwest::Client) -> Result<(RodioChannel, RodioChannel)> {
        let (init_tx, init_rx) = std::sync::mpsc::sync_channel(1);

        std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let (stream, handle) = match rodio::OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = init_tx.send(Err(format!("failed to open audio output: {}", e)));
                        return;
                    }
                };

                let sinks = Sink::try_new(&handle).and_then(|a| {
                    let b = Sink::try_new(&handle)?;
                    Ok((a, b))
                });

                match sinks {
                    Ok(pair) => {
                        let _ = init_tx.send(Ok(pair));
                    }
                    Err(e) => {
                        let _ = init_tx.send(Err(format!("failed to create audio sinks: {}", e)));
                        return;
                    }
                }

                // The OutputStream must outlive every sink; park here for
                // the rest of the process lifetime.
                let _stream = stream;
                loop {
                    std::thread::park();
                }
            })
            .map_err(|e| Error::Channel(format!("failed to spawn audio thread: {}", e)))?;

        let (sink_a, sink_b) = init_rx
            .recv()
            .map_err(|_| Error::Channel("audio thread terminated during init".to_string()))?
            .map_err(Error::Channel)?;

        Ok((
            RodioChannel::new(sink_a, http.clone()),
            RodioChannel::new(sink_b, http),
        ))
    }

    /// Fetch, decode and enqueue a source; runs detached from `set_source`
    async fn load(
        url: String,
        generation: u64,
        http: reqwest::Client,
        sink: Arc<Sink>,
        shared: Arc<Mutex<Shared>>,
        generation_counter: Arc<AtomicU64>,
        event_tx: broadcast::Sender<ChannelEvent>,
    ) {
        let bytes = match http.get(&url).send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Stream fetch failed for {}: {}", url, e);
                    let _ = event_tx.send(ChannelEvent::Error {
                        message: e.to_string(),
                    });
                    return;
                }
            },
            Err(e) => {
                warn!("Stream request failed for {}: {}", url, e);
                let _ = event_tx.send(ChannelEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        // Superseded while fetching
        if generation_counter.load(Ordering::SeqCst) != generation {
            debug!("Discarding stale stream fetch for {}", url);
            return;
        }

        let decoder = match Decoder::new(Cursor::new(bytes.to_vec())) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!("Stream decode failed for {}: {}", url, e);
                let _ = event_tx.send(ChannelEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        let duration_secs = decoder.total_duration().map(|d| d.as_secs_f64());
        if let Some(secs) = duration_secs {
            shared.lock().unwrap().duration_secs = Some(secs);
            let _ = event_tx.send(ChannelEvent::MetadataLoaded {
                duration_secs: secs,
            });
        }

        sink.append(decoder);
        debug!("Stream ready: {} ({:?}s)", url, duration_secs);

        // Emit Ended once when the sink drains, unless superseded first
        let sink_watch = Arc::clone(&sink);
        let counter_watch = Arc::clone(&generation_counter);
        let event_tx_watch = event_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(END_POLL_MS)).await;
                if counter_watch.load(Ordering::SeqCst) != generation {
                    return;
                }
                if sink_watch.empty() {
                    let _ = event_tx_watch.send(ChannelEvent::Ended);
                    return;
                }
            }
        });
    }
}

impl AudioChannel for RodioChannel {
    fn set_source(&self, url: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut shared = self.shared.lock().unwrap();
            shared.source_url = Some(url.to_string());
            shared.duration_secs = None;
        }

        // New source starts paused, like assigning a fresh element src;
        // clear() empties the queue and pauses, leaving the sink reusable
        self.sink.clear();

        tokio::spawn(Self::load(
            url.to_string(),
            generation,
            self.http.clone(),
            Arc::clone(&self.sink),
            Arc::clone(&self.shared),
            Arc::clone(&self.generation),
            self.event_tx.clone(),
        ));
    }

    fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut shared = self.shared.lock().unwrap();
        shared.source_url = None;
        shared.duration_secs = None;
        drop(shared);

        self.sink.clear();
    }

    fn play(&self) {
        self.sink.play();
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn seek(&self, position_secs: f64) {
        let target = Duration::from_secs_f64(position_secs.max(0.0));
        if let Err(e) = self.sink.try_seek(target) {
            warn!("Seek to {:.1}s failed: {:?}", position_secs, e);
        }
    }

    fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    fn position_secs(&self) -> f64 {
        self.sink.get_pos().as_secs_f64()
    }

    fn duration_secs(&self) -> Option<f64> {
        self.shared.lock().unwrap().duration_secs
    }

    fn is_playing(&self) -> bool {
        !self.sink.is_paused() && !self.sink.empty()
    }

    fn source_url(&self) -> Option<String> {
        self.shared.lock().unwrap().source_url.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }
}
