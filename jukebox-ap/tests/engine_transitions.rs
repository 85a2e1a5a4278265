//! Crossfade scheduling and transition integration tests
//!
//! Runs the engine against mock channels and a scripted oracle under the
//! paused tokio clock, so timer math is exact: with duration D, crossfade
//! length C and the stock 1.5s safety margin, the fade must fire at
//! `D - C - 1.5` seconds.

mod common;

use common::*;
use jukebox_ap::channel::AudioChannel;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test(start_paused = true)]
async fn test_schedule_fires_at_duration_minus_crossfade_minus_margin() {
    let mut h = harness(crossfade_config(5.0)).await;
    h.oracle.set_decision(Some(no_next()));

    let track = Uuid::new_v4();
    h.engine
        .load_track(track, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.channel_a.emit_metadata(180.0);
    settle().await;

    // 180 - 5 - 1.5 = 173.5s; just before it nothing has fired
    advance_and_settle(Duration::from_secs_f64(173.4)).await;
    assert_eq!(h.oracle.queries(), 0);

    advance_and_settle(Duration::from_millis(200)).await;
    assert_eq!(h.oracle.queries(), 1);

    drop(drain(&mut h.events));
}

#[tokio::test(start_paused = true)]
async fn test_no_timer_armed_when_crossfade_disabled() {
    let mut h = harness(crossfade_config(0.0)).await;
    h.oracle.set_decision(Some(no_next()));

    let track = Uuid::new_v4();
    h.engine
        .load_track(track, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.channel_a.emit_metadata(180.0);
    settle().await;

    // Crossfade disabled falls through to a single gapless probe
    assert_eq!(h.oracle.queries(), 1);
    assert!(h.channel_b.source_url().is_none());

    // No timer exists to fire later
    advance_and_settle(Duration::from_secs(300)).await;
    assert_eq!(h.oracle.queries(), 1);

    drop(drain(&mut h.events));
}

#[tokio::test(start_paused = true)]
async fn test_seek_past_start_point_triggers_immediately_and_once() {
    let h = harness(crossfade_config(5.0)).await;
    h.oracle.set_decision(Some(no_next()));

    let track = Uuid::new_v4();
    h.engine
        .load_track(track, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.channel_a.emit_metadata(180.0);
    settle().await;

    h.engine.seek(175.0).await;
    settle().await;
    assert_eq!(h.oracle.queries(), 1);

    // The schedule was consumed; a second seek past the point is a no-op
    h.engine.seek(176.0).await;
    settle().await;
    assert_eq!(h.oracle.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_seek_before_start_point_rearms_timer() {
    let h = harness(crossfade_config(5.0)).await;
    h.oracle.set_decision(Some(no_next()));

    let track = Uuid::new_v4();
    h.engine
        .load_track(track, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.channel_a.emit_metadata(180.0);
    settle().await;

    // Jump to 100s: remaining delta to the 173.5s start point is 73.5s
    h.engine.seek(100.0).await;
    settle().await;

    advance_and_settle(Duration::from_secs_f64(73.4)).await;
    assert_eq!(h.oracle.queries(), 0);

    advance_and_settle(Duration::from_millis(200)).await;
    assert_eq!(h.oracle.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_seek_twice_past_point_starts_single_fade() {
    let mut h = harness(crossfade_config(5.0)).await;
    let track1 = Uuid::new_v4();
    let track2 = Uuid::new_v4();
    h.oracle.set_decision(Some(crossfade_into(track2, None)));

    h.engine
        .load_track(track1, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.engine.play().await;
    h.channel_a.emit_metadata(180.0);
    settle().await;

    h.engine.seek(175.0).await;
    h.engine.seek(176.0).await;
    settle().await;
    assert_eq!(h.oracle.queries(), 1);

    advance_and_settle(Duration::from_secs_f64(5.1)).await;

    let events = drain(&mut h.events);
    assert_eq!(count_type(&events, "CrossfadeStarted"), 1);
    assert_eq!(count_type(&events, "TransitionComplete"), 1);
    assert_eq!(h.oracle.advances(), 1);
    assert_eq!(h.engine.current_track_id().await, Some(track2));
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_crossfade() {
    let mut h = harness(crossfade_config(5.0)).await;
    let track1 = Uuid::new_v4();
    let track2 = Uuid::new_v4();
    h.oracle.set_decision(Some(crossfade_into(track2, None)));

    h.engine
        .load_track(track1, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.engine.play().await;
    h.channel_a.emit_metadata(180.0);
    settle().await;

    // Fires at 173.5s and begins the fade
    advance_and_settle(Duration::from_secs_f64(173.5)).await;
    assert_eq!(h.oracle.queries(), 1);
    assert_eq!(
        h.channel_b.source_url(),
        Some(format!("mock://stream/{}", track2))
    );
    assert!(h.channel_b.is_playing());
    assert!(h.channel_a.is_playing());
    assert!(h.engine.is_playing());

    // Halfway through the ramp: ease(0.5) = 0.75
    advance_and_settle(Duration::from_secs_f64(2.5)).await;
    assert!((h.channel_b.volume() - 0.75).abs() < 0.05, "incoming volume {}", h.channel_b.volume());
    assert!((h.channel_a.volume() - 0.25).abs() < 0.05, "outgoing volume {}", h.channel_a.volume());

    // Ramp completes at 178.5s: atomic swap, exactly one advance
    advance_and_settle(Duration::from_secs_f64(2.6)).await;
    assert_eq!(h.engine.current_track_id().await, Some(track2));
    assert!(h.channel_b.is_playing());
    assert!(!h.channel_a.is_playing());
    assert_eq!(h.oracle.advances(), 1);

    let events = drain(&mut h.events);
    assert_eq!(count_type(&events, "CrossfadeStarted"), 1);
    assert_eq!(count_type(&events, "TransitionComplete"), 1);
    assert_eq!(count_type(&events, "TrackEnded"), 0);

    // A late native ended from the drained channel changes nothing
    h.channel_a.emit_ended();
    settle().await;
    assert_eq!(h.oracle.advances(), 1);
    let events = drain(&mut h.events);
    assert_eq!(count_type(&events, "TrackEnded"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_oracle_decline_leaves_native_ended_fallback() {
    let mut h = harness(crossfade_config(5.0)).await;
    let track = Uuid::new_v4();
    h.oracle.set_decision(Some(no_next()));

    h.engine
        .load_track(track, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.engine.play().await;
    h.channel_a.emit_metadata(30.0);
    settle().await;

    advance_and_settle(Duration::from_secs_f64(23.6)).await;
    assert_eq!(h.oracle.queries(), 1);

    // Declined: no fade side effects, the track just runs out
    drop(drain(&mut h.events));
    h.channel_a.emit_ended();
    settle().await;

    let events = drain(&mut h.events);
    assert_eq!(count_type(&events, "TrackEnded"), 1);
    assert_eq!(count_type(&events, "CrossfadeStarted"), 0);
    assert_eq!(h.oracle.advances(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_oracle_failure_treated_as_decline() {
    let mut h = harness(crossfade_config(5.0)).await;
    let track = Uuid::new_v4();
    h.oracle.set_decision(None); // every query errors

    h.engine
        .load_track(track, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.engine.play().await;
    h.channel_a.emit_metadata(30.0);
    settle().await;

    advance_and_settle(Duration::from_secs_f64(23.6)).await;
    assert_eq!(h.oracle.queries(), 1);
    assert_eq!(h.engine.current_track_id().await, Some(track));

    drop(drain(&mut h.events));
    h.channel_a.emit_ended();
    settle().await;

    let events = drain(&mut h.events);
    assert_eq!(count_type(&events, "TrackEnded"), 1);
    assert_eq!(h.oracle.advances(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_decision_after_new_load_is_discarded() {
    let mut h = harness(crossfade_config(5.0)).await;
    let track1 = Uuid::new_v4();
    let track2 = Uuid::new_v4();
    let track3 = Uuid::new_v4();
    h.oracle.set_decision(Some(crossfade_into(track2, None)));
    h.oracle.set_delay(Duration::from_secs(1));

    h.engine
        .load_track(track1, None, Some("default".to_string()), None)
        .await;
    settle().await;
    h.channel_a.emit_metadata(30.0);
    settle().await;

    // Fire the schedule; the oracle response is now in flight for 1s
    advance_and_settle(Duration::from_secs_f64(23.5)).await;
    assert_eq!(h.oracle.queries(), 1);

    // A new load supersedes the query before it resolves
    h.engine.load_track(track3, None, None, None).await;
    settle().await;
    drop(drain(&mut h.events));

    advance_and_settle(Duration::from_secs(1)).await;

    // The late decision was for track1 and must be dropped silently
    let events = drain(&mut h.events);
    assert_eq!(count_type(&events, "CrossfadeStarted"), 0);
    assert!(!h.channel_b.is_playing());
    assert_eq!(h.engine.current_track_id().await, Some(track3));
}
