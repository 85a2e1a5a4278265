//! Playback engine orchestration
//!
//! Owns the two audio channels and the transition logic between tracks.
//! The engine ping-pongs between channels: the "current" one is audible
//! and transport-controlled, the other is reserved for preloading the next
//! track. Near the end of each track the engine consults the transition
//! oracle and either runs a timed crossfade, performs a silent gapless
//! switch when the track ends, or raises a plain end-of-track event for
//! the collaborator to resolve.
//!
//! For a given track at most one transition mechanism is armed at a time:
//! an armed crossfade schedule (`scheduled_duration` + timer) and a
//! gapless preload are mutually exclusive, and loading a new track cancels
//! everything armed for the previous one.

use crate::channel::{AudioChannel, ChannelEvent};
use crate::config::{self, EngineConfig};
use crate::oracle::TransitionOracle;
use crate::playback::sched::ScheduledTask;
use crate::state::SharedState;
use chrono::Utc;
use jukebox_common::{fade, gain, JukeboxEvent, PlaybackState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A preloaded-but-not-yet-audible next track
#[derive(Debug, Clone)]
struct GaplessNext {
    track_id: Uuid,
    replaygain_db: Option<f64>,
}

/// Mutable engine state, guarded by a single lock
struct EngineInner {
    /// Index (0/1) of the audible channel
    current: usize,

    /// Identity and gain of the audible track
    current_track: Option<Uuid>,
    current_gain_db: Option<f64>,

    /// User-set master volume (0-100)
    base_volume: u8,

    /// Active collection context for oracle queries
    collection: Option<String>,

    /// Configured crossfade length (0-12 s); 0 disables timed crossfades
    crossfade_secs: f64,

    /// Duration basis of the armed crossfade schedule; present iff a
    /// crossfade is armed but not yet started. Consumed atomically when
    /// the start routine triggers, which makes repeated triggers no-ops.
    scheduled_duration: Option<f64>,

    /// Preloaded gapless candidate for the ended handler
    gapless_next: Option<GaplessNext>,

    /// Fade ramp in flight; suppresses the ended handler
    crossfading: bool,

    /// Duration-discovery fallback timer
    metadata_timer: Option<ScheduledTask>,

    /// Armed crossfade start timer
    crossfade_timer: Option<ScheduledTask>,

    /// Running fade ramp
    fade_ramp: Option<ScheduledTask>,

    /// Channel event listeners, live for the engine lifetime
    listeners: Vec<ScheduledTask>,
}

/// Playback engine: two-channel transport plus autonomous transitions
pub struct PlaybackEngine {
    channels: [Arc<dyn AudioChannel>; 2],
    oracle: Arc<dyn TransitionOracle>,
    state: Arc<SharedState>,
    config: EngineConfig,
    inner: Arc<Mutex<EngineInner>>,
}

impl PlaybackEngine {
    /// Create a new engine
    pub fn new(
        channels: [Arc<dyn AudioChannel>; 2],
        oracle: Arc<dyn TransitionOracle>,
        state: Arc<SharedState>,
        config: EngineConfig,
    ) -> Self {
        let crossfade_secs = config::normalize_crossfade_secs(config.crossfade_secs);
        Self {
            channels,
            oracle,
            state,
            config,
            inner: Arc::new(Mutex::new(EngineInner {
                current: 0,
                current_track: None,
                current_gain_db: None,
                base_volume: 100,
                collection: None,
                crossfade_secs,
                scheduled_duration: None,
                gapless_next: None,
                crossfading: false,
                metadata_timer: None,
                crossfade_timer: None,
                fade_ramp: None,
                listeners: Vec::new(),
            })),
        }
    }

    /// Start listening to channel events
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        for index in 0..self.channels.len() {
            let engine = self.clone_handles();
            let mut events = self.channels[index].subscribe();
            inner.listeners.push(ScheduledTask::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => engine.handle_channel_event(index, event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Channel {} listener lagged, skipped {} events", index, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }
        info!("Playback engine started");
    }

    /// Stop listeners and cancel everything pending
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        self.cancel_pending(&mut inner);
        inner.listeners.clear();
        for channel in &self.channels {
            channel.pause();
        }
        info!("Playback engine shut down");
    }

    /// Assign a track to the current channel and begin streaming it
    ///
    /// Loading the track that is already current and loaded is a no-op
    /// apart from refreshing the collection context and rearming the
    /// crossfade schedule from the duration hint; the UI does exactly this
    /// right after the engine performed a silent channel swap.
    pub async fn load_track(
        &self,
        track_id: Uuid,
        replaygain_db: Option<f64>,
        collection: Option<String>,
        duration_hint_ms: Option<u64>,
    ) {
        let url = self.oracle.stream_url(track_id);
        let hint_secs = duration_hint_ms.map(|ms| ms as f64 / 1000.0);

        let mut inner = self.inner.lock().await;
        let current = inner.current;

        let already_loaded = inner.current_track == Some(track_id)
            && self.channels[current].source_url().as_deref() == Some(url.as_str());
        if already_loaded {
            if let Some(collection) = collection {
                inner.collection = Some(collection);
            }
            if inner.crossfading {
                return;
            }
            if let Some(timer) = inner.crossfade_timer.take() {
                timer.cancel();
            }
            inner.scheduled_duration = None;
            if let Some(duration) = self.channels[current].duration_secs().or(hint_secs) {
                self.schedule_crossfade(&mut inner, duration);
            }
            debug!("Track {} already loaded; rescheduled only", track_id);
            return;
        }

        self.cancel_pending(&mut inner);
        inner.current_track = Some(track_id);
        inner.current_gain_db = replaygain_db;
        if collection.is_some() {
            inner.collection = collection;
        }

        let other = current ^ 1;
        self.channels[other].clear();
        self.channels[current].set_source(&url);
        self.channels[current]
            .set_volume(gain::channel_volume(inner.base_volume, replaygain_db));

        // Duration discovery: the channel's metadata event is the primary
        // path; this timer supplies the hint so a slow-loading stream
        // cannot block scheduling indefinitely.
        let engine = self.clone_handles();
        inner.metadata_timer = Some(ScheduledTask::once(
            Duration::from_millis(self.config.metadata_fallback_ms),
            async move {
                engine.metadata_fallback(track_id, hint_secs).await;
            },
        ));

        info!("Loaded track {} on channel {}", track_id, current);
        self.state.broadcast_event(JukeboxEvent::TrackLoaded {
            track_id,
            timestamp: Utc::now(),
        });
    }

    /// Resume the current channel
    pub async fn play(&self) {
        let inner = self.inner.lock().await;
        self.channels[inner.current].play();
        drop(inner);
        self.state.broadcast_event(JukeboxEvent::PlaybackStateChanged {
            state: PlaybackState::Playing,
            timestamp: Utc::now(),
        });
    }

    /// Pause both channels (the next one may be mid-preload or fading in)
    pub async fn pause(&self) {
        let inner = self.inner.lock().await;
        self.channels[inner.current].pause();
        self.channels[inner.current ^ 1].pause();
        drop(inner);
        self.state.broadcast_event(JukeboxEvent::PlaybackStateChanged {
            state: PlaybackState::Paused,
            timestamp: Utc::now(),
        });
    }

    /// Cancel everything pending and rewind both channels, paused
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        self.cancel_pending(&mut inner);
        for channel in &self.channels {
            channel.pause();
            channel.seek(0.0);
        }
        drop(inner);
        self.state.broadcast_event(JukeboxEvent::PlaybackStateChanged {
            state: PlaybackState::Stopped,
            timestamp: Utc::now(),
        });
    }

    /// Jump to a position and recompute the crossfade schedule
    ///
    /// The armed schedule was anchored to elapsed time from track start,
    /// so seeking must rebase it: past the start point the crossfade
    /// triggers immediately (once), otherwise the timer is re-armed for
    /// the remaining delta.
    pub async fn seek(&self, position_secs: f64) {
        let mut inner = self.inner.lock().await;
        self.channels[inner.current].seek(position_secs);

        if inner.crossfading {
            return;
        }
        let Some(scheduled_duration) = inner.scheduled_duration else {
            return;
        };

        let start_at =
            (scheduled_duration - inner.crossfade_secs - self.config.safety_margin_secs).max(0.0);
        if position_secs >= start_at {
            if let Some(timer) = inner.crossfade_timer.take() {
                timer.cancel();
            }
            debug!("Seek past crossfade point; starting fade now");
            let engine = self.clone_handles();
            tokio::spawn(async move {
                engine.start_crossfade().await;
            });
        } else {
            let engine = self.clone_handles();
            inner.crossfade_timer = Some(ScheduledTask::once(
                Duration::from_secs_f64(start_at - position_secs),
                async move {
                    engine.start_crossfade().await;
                },
            ));
        }
    }

    /// Set master volume (0-100) and restage channel gains
    pub async fn set_volume(&self, volume: u8) {
        let mut inner = self.inner.lock().await;
        inner.base_volume = volume.min(100);

        let current = inner.current;
        self.channels[current]
            .set_volume(gain::channel_volume(inner.base_volume, inner.current_gain_db));

        // The fade ramp owns the next channel's volume while it runs
        if !inner.crossfading {
            let other_gain = match &inner.gapless_next {
                Some(next) => next.replaygain_db,
                None => inner.current_gain_db,
            };
            self.channels[current ^ 1]
                .set_volume(gain::channel_volume(inner.base_volume, other_gain));
        }

        let volume = inner.base_volume;
        drop(inner);
        self.state.broadcast_event(JukeboxEvent::VolumeChanged {
            volume,
            timestamp: Utc::now(),
        });
    }

    /// Update the configured crossfade length (clamped to 0-12 s)
    pub async fn set_crossfade_secs(&self, secs: f64) {
        let normalized = config::normalize_crossfade_secs(secs);
        self.inner.lock().await.crossfade_secs = normalized;
    }

    pub async fn crossfade_secs(&self) -> f64 {
        self.inner.lock().await.crossfade_secs
    }

    pub async fn current_track_id(&self) -> Option<Uuid> {
        self.inner.lock().await.current_track
    }

    pub async fn base_volume(&self) -> u8 {
        self.inner.lock().await.base_volume
    }

    /// Position of the current channel, in seconds
    pub async fn current_time(&self) -> f64 {
        let inner = self.inner.lock().await;
        self.channels[inner.current].position_secs()
    }

    /// Duration of the current channel's source, once discovered
    pub async fn duration(&self) -> Option<f64> {
        let inner = self.inner.lock().await;
        self.channels[inner.current].duration_secs()
    }

    /// True if either channel is audible (both are, briefly, mid-fade)
    pub fn is_playing(&self) -> bool {
        self.channels.iter().any(|channel| channel.is_playing())
    }

    /// Drop every pending transition mechanism
    ///
    /// All cancellations are idempotent; dropping a handle aborts the task.
    fn cancel_pending(&self, inner: &mut EngineInner) {
        inner.metadata_timer = None;
        inner.crossfade_timer = None;
        inner.fade_ramp = None;
        inner.scheduled_duration = None;
        inner.gapless_next = None;
        inner.crossfading = false;
    }

    /// Clone handles for spawned tasks
    fn clone_handles(&self) -> Self {
        Self {
            channels: [Arc::clone(&self.channels[0]), Arc::clone(&self.channels[1])],
            oracle: Arc::clone(&self.oracle),
            state: Arc::clone(&self.state),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
        }
    }

    async fn handle_channel_event(&self, index: usize, event: ChannelEvent) {
        match event {
            ChannelEvent::MetadataLoaded { duration_secs } => {
                let mut inner = self.inner.lock().await;
                if index != inner.current {
                    // Preload metadata; nothing to schedule
                    return;
                }
                if let Some(timer) = inner.metadata_timer.take() {
                    timer.cancel();
                }
                if inner.crossfading
                    || inner.scheduled_duration.is_some()
                    || inner.gapless_next.is_some()
                {
                    return;
                }
                self.schedule_crossfade(&mut inner, duration_secs);
            }
            ChannelEvent::Ended => self.handle_ended(index).await,
            ChannelEvent::Error { message } => {
                // No automatic retry or skip; the collaborator reacts to
                // the resulting silence via the ended/error surface
                warn!("Channel {} stream error: {}", index, message);
            }
        }
    }

    /// Fallback path of duration discovery, armed at load time
    async fn metadata_fallback(&self, track_id: Uuid, hint_secs: Option<f64>) {
        let mut inner = self.inner.lock().await;
        if inner.current_track != Some(track_id) {
            return; // superseded while waiting
        }
        if let Some(timer) = inner.metadata_timer.take() {
            // Our own handle
            timer.detach();
        }
        if inner.crossfading || inner.scheduled_duration.is_some() || inner.gapless_next.is_some()
        {
            return;
        }

        let current = inner.current;
        match self.channels[current].duration_secs().or(hint_secs) {
            Some(duration) => self.schedule_crossfade(&mut inner, duration),
            None => {
                // Duration never discovered: no crossfade can be
                // scheduled; try a gapless preload and otherwise rely on
                // the native ended event.
                debug!("No duration for track {}; skipping crossfade schedule", track_id);
                let engine = self.clone_handles();
                tokio::spawn(async move {
                    engine.try_preload_gapless().await;
                });
            }
        }
    }

    /// Arm the crossfade timer for `duration - crossfade - margin`
    ///
    /// With crossfade disabled or no collection context this is a no-op
    /// apart from falling through to a gapless preload attempt.
    fn schedule_crossfade(&self, inner: &mut EngineInner, duration_secs: f64) {
        let crossfade_secs = inner.crossfade_secs;
        if crossfade_secs <= 0.0 || inner.collection.is_none() {
            if inner.gapless_next.is_none() && !inner.crossfading {
                let engine = self.clone_handles();
                tokio::spawn(async move {
                    engine.try_preload_gapless().await;
                });
            }
            return;
        }

        // Arming a timed crossfade excludes any gapless preload
        inner.gapless_next = None;

        // The margin guarantees the fade fires before the native
        // end-of-stream does
        let start_at =
            (duration_secs - crossfade_secs - self.config.safety_margin_secs).max(0.0);
        inner.scheduled_duration = Some(duration_secs);

        let position = self.channels[inner.current].position_secs();
        let delay = (start_at - position).max(0.0);
        debug!(
            "Crossfade armed at {:.1}s of {:.1}s (firing in {:.1}s)",
            start_at, duration_secs, delay
        );

        let engine = self.clone_handles();
        inner.crossfade_timer = Some(ScheduledTask::once(
            Duration::from_secs_f64(delay),
            async move {
                engine.start_crossfade().await;
            },
        ));
    }

    /// Consult the oracle and, if it agrees, begin the fade ramp
    ///
    /// Consumes the armed schedule on entry, so concurrent triggers (timer
    /// vs. seek) collapse into a single fade. An oracle decline or failure
    /// leaves the native ended event as the fallback transition.
    async fn start_crossfade(&self) {
        let (from_track, collection) = {
            let mut inner = self.inner.lock().await;
            if let Some(timer) = inner.crossfade_timer.take() {
                // Possibly our own handle; never abort it
                timer.detach();
            }
            if inner.crossfading || inner.scheduled_duration.take().is_none() {
                return;
            }
            let (Some(track), Some(collection)) =
                (inner.current_track, inner.collection.clone())
            else {
                return;
            };
            (track, collection)
        };

        let decision = match self.oracle.next_transition(&collection).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Transition query failed; falling back to track end: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.current_track != Some(from_track) || inner.crossfading {
            debug!("Discarding stale transition decision");
            return;
        }
        let Some(next_track) = decision.next_track_id else {
            return;
        };
        if !decision.apply_crossfade {
            return;
        }

        inner.crossfading = true;
        inner.gapless_next = None;

        let outgoing = inner.current;
        let incoming = outgoing ^ 1;
        let fade_secs = inner.crossfade_secs;
        let target_in = gain::channel_volume(inner.base_volume, decision.next_replaygain_db);
        let from_out = gain::channel_volume(inner.base_volume, inner.current_gain_db);

        let url = self.oracle.stream_url(next_track);
        self.channels[incoming].set_source(&url);
        self.channels[incoming].set_volume(0.0);
        self.channels[incoming].play();

        info!(
            "Crossfading {} -> {} over {:.1}s",
            from_track, next_track, fade_secs
        );
        self.state.broadcast_event(JukeboxEvent::CrossfadeStarted {
            from_track_id: from_track,
            to_track_id: next_track,
            duration_secs: fade_secs,
            timestamp: Utc::now(),
        });

        let engine = self.clone_handles();
        let next_gain_db = decision.next_replaygain_db;
        inner.fade_ramp = Some(ScheduledTask::spawn(async move {
            engine
                .run_fade_ramp(outgoing, incoming, fade_secs, from_out, target_in, next_track, next_gain_db)
                .await;
        }));
    }

    /// Drive both channel volumes through the fade
    ///
    /// Progress is recomputed from elapsed wall-clock time on every tick,
    /// so missed ticks stretch nothing.
    #[allow(clippy::too_many_arguments)]
    async fn run_fade_ramp(
        &self,
        outgoing: usize,
        incoming: usize,
        fade_secs: f64,
        from_out: f32,
        target_in: f32,
        next_track: Uuid,
        next_gain_db: Option<f64>,
    ) {
        let started = tokio::time::Instant::now();
        let mut tick = tokio::time::interval(Duration::from_millis(self.config.fade_tick_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            let elapsed = started.elapsed().as_secs_f64();
            let t = if fade_secs > 0.0 {
                (elapsed / fade_secs).min(1.0)
            } else {
                1.0
            };
            let eased = fade::ease(t);
            self.channels[incoming].set_volume(target_in * eased as f32);
            self.channels[outgoing].set_volume(from_out * (1.0 - eased) as f32);
            if t >= 1.0 {
                break;
            }
        }

        self.finish_crossfade(outgoing, incoming, next_track, next_gain_db)
            .await;
    }

    /// Atomic channel swap at the end of the ramp
    async fn finish_crossfade(
        &self,
        outgoing: usize,
        incoming: usize,
        next_track: Uuid,
        next_gain_db: Option<f64>,
    ) {
        let collection = {
            let mut inner = self.inner.lock().await;
            self.channels[outgoing].pause();
            self.channels[outgoing].clear();
            inner.current = incoming;
            inner.current_track = Some(next_track);
            inner.current_gain_db = next_gain_db;
            inner.crossfading = false;
            if let Some(ramp) = inner.fade_ramp.take() {
                // Our own handle
                ramp.detach();
            }
            inner.collection.clone()
        };

        info!("Crossfade complete; channel {} is now current", incoming);

        // Keep server-side "now playing" aligned with what is audible
        if let Some(collection) = collection {
            if let Err(e) = self.oracle.notify_advance(&collection).await {
                warn!("Advance notification failed: {}", e);
            }
        }

        self.state.broadcast_event(JukeboxEvent::TransitionComplete {
            track_id: next_track,
            timestamp: Utc::now(),
        });
    }

    /// Native end-of-stream on a channel
    async fn handle_ended(&self, index: usize) {
        let mut inner = self.inner.lock().await;
        if index != inner.current {
            return; // old channel draining after a swap
        }
        if inner.crossfading {
            // The fade's completion routine owns this transition
            return;
        }
        let Some(ended_track) = inner.current_track else {
            return;
        };

        if let Some(next) = inner.gapless_next.take() {
            // Silent flip into the already-buffered channel
            let old = inner.current;
            let new = old ^ 1;
            self.channels[old].pause();
            self.channels[old].clear();
            inner.current = new;
            inner.current_track = Some(next.track_id);
            inner.current_gain_db = next.replaygain_db;
            self.channels[new]
                .set_volume(gain::channel_volume(inner.base_volume, next.replaygain_db));
            self.channels[new].play();
            let collection = inner.collection.clone();
            drop(inner);

            info!("Gapless switch {} -> {}", ended_track, next.track_id);
            if let Some(collection) = collection {
                if let Err(e) = self.oracle.notify_advance(&collection).await {
                    warn!("Advance notification failed: {}", e);
                }
            }
            self.state.broadcast_event(JukeboxEvent::TransitionComplete {
                track_id: next.track_id,
                timestamp: Utc::now(),
            });

            // Chain straight into the following candidate
            self.try_preload_gapless().await;
        } else {
            drop(inner);
            debug!("Track {} ended with no transition armed", ended_track);
            self.state.broadcast_event(JukeboxEvent::TrackEnded {
                track_id: ended_track,
                timestamp: Utc::now(),
            });
        }
    }

    /// Ask the oracle for a gapless candidate and preload it
    ///
    /// Only runs when no crossfade is scheduled for the current track;
    /// a next track flagged "do not crossfade" is buffered silently into
    /// the other channel for the ended handler to flip to.
    async fn try_preload_gapless(&self) {
        let (track_id, collection) = {
            let inner = self.inner.lock().await;
            if inner.crossfading
                || inner.scheduled_duration.is_some()
                || inner.gapless_next.is_some()
            {
                return;
            }
            let (Some(track), Some(collection)) = (inner.current_track, inner.collection.clone())
            else {
                return;
            };
            (track, collection)
        };

        let decision = match self.oracle.next_transition(&collection).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Gapless preload query failed: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.current_track != Some(track_id) {
            return; // superseded while the query was in flight
        }
        if inner.crossfading || inner.scheduled_duration.is_some() || inner.gapless_next.is_some()
        {
            return;
        }
        let Some(next_track) = decision.next_track_id else {
            return;
        };
        if decision.apply_crossfade {
            // Policy wants a fade; that path is owned by the scheduler
            return;
        }

        let other = inner.current ^ 1;
        let url = self.oracle.stream_url(next_track);
        self.channels[other].set_source(&url);
        self.channels[other]
            .set_volume(gain::channel_volume(inner.base_volume, decision.next_replaygain_db));
        inner.gapless_next = Some(GaplessNext {
            track_id: next_track,
            replaygain_db: decision.next_replaygain_db,
        });
        debug!("Preloaded gapless candidate {}", next_track);
    }
}
