//! ReplayGain and master volume math
//!
//! Every channel volume is the product of the user-set master volume
//! (0-100) and the track's ReplayGain loudness correction, clamped into the
//! element's [0.0, 1.0] range. A track without a ReplayGain tag plays at
//! multiplier 1.0.

/// Convert a ReplayGain decibel value to a linear volume multiplier
pub fn replaygain_multiplier(gain_db: f64) -> f64 {
    10f64.powf(gain_db / 20.0)
}

/// Compute the volume to apply to a channel
///
/// `clamp(base_volume/100 * 10^(gain_db/20), 0.0, 1.0)`
pub fn channel_volume(base_volume: u8, gain_db: Option<f64>) -> f32 {
    let base = base_volume.min(100) as f64 / 100.0;
    let multiplier = gain_db.map(replaygain_multiplier).unwrap_or(1.0);
    (base * multiplier).clamp(0.0, 1.0) as f32
}
