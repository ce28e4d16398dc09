//! Voice session settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Normalized RMS level above which the local user counts as speaking
    /// (valid range: 0.0-1.0).
    pub speaking_threshold: f64,
    /// Sampling period of the level meter, in milliseconds (valid range: 5-250).
    pub frame_interval_ms: u64,
    /// Frequency bins read per sample (valid range: 16-2048).
    pub analyser_bins: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Volume applied to remote playback (valid range: 0.0-1.0).
    pub playback_volume: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            speaking_threshold: 0.02,
            frame_interval_ms: 16,
            analyser_bins: 128,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            playback_volume: 1.0,
        }
    }
}
