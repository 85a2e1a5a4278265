//! Shared test doubles for engine integration tests
//!
//! `MockChannel` mimics a native streaming element: transport calls mutate
//! plain state, and tests push `MetadataLoaded`/`Ended` events through it
//! the way a real stream would. `MockOracle` serves a scripted transition
//! decision and counts queries and advance notifications.

#![allow(dead_code)]

use async_trait::async_trait;
use jukebox_ap::channel::{AudioChannel, ChannelEvent};
use jukebox_ap::config::EngineConfig;
use jukebox_ap::oracle::{TransitionDecision, TransitionOracle};
use jukebox_ap::playback::PlaybackEngine;
use jukebox_ap::{Error, Result, SharedState};
use jukebox_common::JukeboxEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct MockChannelState {
    pub source_url: Option<String>,
    pub duration: Option<f64>,
    pub position: f64,
    pub paused: bool,
    pub volume: f32,
    pub set_source_calls: usize,
}

impl Default for MockChannelState {
    fn default() -> Self {
        Self {
            source_url: None,
            duration: None,
            position: 0.0,
            paused: true,
            volume: 1.0,
            set_source_calls: 0,
        }
    }
}

pub struct MockChannel {
    state: Mutex<MockChannelState>,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            state: Mutex::new(MockChannelState::default()),
            event_tx,
        })
    }

    /// Simulate the stream's metadata arriving
    pub fn emit_metadata(&self, duration_secs: f64) {
        self.state.lock().unwrap().duration = Some(duration_secs);
        let _ = self.event_tx.send(ChannelEvent::MetadataLoaded { duration_secs });
    }

    /// Simulate the native end-of-stream signal
    pub fn emit_ended(&self) {
        let _ = self.event_tx.send(ChannelEvent::Ended);
    }

    pub fn set_position(&self, secs: f64) {
        self.state.lock().unwrap().position = secs;
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }

    pub fn paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    pub fn set_source_calls(&self) -> usize {
        self.state.lock().unwrap().set_source_calls
    }
}

impl AudioChannel for MockChannel {
    fn set_source(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.set_source_calls += 1;
        state.source_url = Some(url.to_string());
        state.duration = None;
        state.position = 0.0;
        state.paused = true;
    }

    fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.source_url = None;
        state.duration = None;
        state.position = 0.0;
        state.paused = true;
    }

    fn play(&self) {
        self.state.lock().unwrap().paused = false;
    }

    fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    fn seek(&self, position_secs: f64) {
        self.state.lock().unwrap().position = position_secs;
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().unwrap().volume = volume;
    }

    fn position_secs(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    fn duration_secs(&self) -> Option<f64> {
        self.state.lock().unwrap().duration
    }

    fn is_playing(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.source_url.is_some() && !state.paused
    }

    fn source_url(&self) -> Option<String> {
        self.state.lock().unwrap().source_url.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }
}

/// Scripted transition oracle
pub struct MockOracle {
    decision: Mutex<Option<TransitionDecision>>,
    delay: Mutex<Duration>,
    queries: AtomicUsize,
    advances: AtomicUsize,
}

impl MockOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            decision: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            queries: AtomicUsize::new(0),
            advances: AtomicUsize::new(0),
        })
    }

    /// Script the next decisions; `None` makes queries fail
    pub fn set_decision(&self, decision: Option<TransitionDecision>) {
        *self.decision.lock().unwrap() = decision;
    }

    /// Add latency to every query (for staleness tests)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransitionOracle for MockOracle {
    async fn next_transition(&self, _collection: &str) -> Result<TransitionDecision> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.decision.lock().unwrap().clone() {
            Some(decision) => Ok(decision),
            None => Err(Error::Internal("oracle offline".to_string())),
        }
    }

    async fn notify_advance(&self, _collection: &str) -> Result<()> {
        self.advances.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stream_url(&self, track_id: Uuid) -> String {
        format!("mock://stream/{}", track_id)
    }
}

/// Decision helpers
pub fn crossfade_into(track_id: Uuid, gain_db: Option<f64>) -> TransitionDecision {
    TransitionDecision {
        next_track_id: Some(track_id),
        next_replaygain_db: gain_db,
        apply_crossfade: true,
    }
}

pub fn gapless_into(track_id: Uuid, gain_db: Option<f64>) -> TransitionDecision {
    TransitionDecision {
        next_track_id: Some(track_id),
        next_replaygain_db: gain_db,
        apply_crossfade: false,
    }
}

pub fn no_next() -> TransitionDecision {
    TransitionDecision {
        next_track_id: None,
        next_replaygain_db: None,
        apply_crossfade: false,
    }
}

pub struct TestHarness {
    pub engine: Arc<PlaybackEngine>,
    pub channel_a: Arc<MockChannel>,
    pub channel_b: Arc<MockChannel>,
    pub oracle: Arc<MockOracle>,
    pub state: Arc<SharedState>,
    pub events: broadcast::Receiver<JukeboxEvent>,
}

/// Build an engine wired to mock channels and oracle
pub async fn harness(config: EngineConfig) -> TestHarness {
    let channel_a = MockChannel::new();
    let channel_b = MockChannel::new();
    let oracle = MockOracle::new();
    let state = Arc::new(SharedState::new());
    let events = state.subscribe_events();

    let channels: [Arc<dyn AudioChannel>; 2] = [
        Arc::clone(&channel_a) as Arc<dyn AudioChannel>,
        Arc::clone(&channel_b) as Arc<dyn AudioChannel>,
    ];
    let oracle_dyn: Arc<dyn TransitionOracle> = Arc::clone(&oracle) as Arc<dyn TransitionOracle>;
    let engine = Arc::new(PlaybackEngine::new(
        channels,
        oracle_dyn,
        Arc::clone(&state),
        config,
    ));
    engine.start().await;

    TestHarness {
        engine,
        channel_a,
        channel_b,
        oracle,
        state,
        events,
    }
}

/// Engine config with a 5s crossfade and the stock margins
pub fn crossfade_config(crossfade_secs: f64) -> EngineConfig {
    EngineConfig {
        crossfade_secs,
        ..EngineConfig::default()
    }
}

/// Let spawned tasks run without advancing the clock
pub async fn settle() {
    for _ in 0..25 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock and let everything it woke run
pub async fn advance_and_settle(duration: Duration) {
    settle().await;
    tokio::time::advance(duration).await;
    settle().await;
}

/// Collect everything currently buffered on the event bus
pub fn drain(rx: &mut broadcast::Receiver<JukeboxEvent>) -> Vec<JukeboxEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Count events of a given type
pub fn count_type(events: &[JukeboxEvent], event_type: &str) -> usize {
    events
        .iter()
        .filter(|event| event.event_type() == event_type)
        .count()
}
