//! Engine configuration
//!
//! The two timing constants here (`safety_margin_secs` and
//! `metadata_fallback_ms`) are empirical, latency-environment-dependent
//! values, so they are configuration rather than hard-coded numbers. The
//! defaults match behavior tuned against real network/decode latency.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Upper bound on the configurable crossfade length, in seconds
pub const MAX_CROSSFADE_SECS: f64 = 12.0;

/// Playback engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Crossfade length in seconds (0-12); 0 disables timed crossfades
    pub crossfade_secs: f64,

    /// Lead time subtracted from the crossfade start so the fade fires
    /// before the native end-of-stream does
    pub safety_margin_secs: f64,

    /// How long to wait for the stream's own metadata before falling back
    /// to the caller-supplied duration hint
    pub metadata_fallback_ms: u64,

    /// Fade ramp tick period; progress is wall-clock based, so a missed
    /// tick shifts nothing
    pub fade_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crossfade_secs: 0.0,
            safety_margin_secs: 1.5,
            metadata_fallback_ms: 600,
            fade_tick_ms: 20,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, keeping defaults for any keys
    /// the file omits
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: EngineConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.crossfade_secs = normalize_crossfade_secs(config.crossfade_secs);
        Ok(config)
    }
}

/// Normalize a crossfade length into the valid [0, 12] range
///
/// Invalid values (NaN, infinite, negative) normalize to 0, which disables
/// the timed crossfade entirely.
pub fn normalize_crossfade_secs(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        return 0.0;
    }
    value.min(MAX_CROSSFADE_SECS)
}
