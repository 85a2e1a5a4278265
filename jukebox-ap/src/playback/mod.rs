//! Playback engine and transition orchestration

pub mod engine;
pub mod monitor;
pub mod sched;

pub use engine::PlaybackEngine;
pub use monitor::start_monitoring;
pub use sched::ScheduledTask;
