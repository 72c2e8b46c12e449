/// `config.rs` — host configuration for the scripting substrate
///
/// Defaults mirror the sizes the system was tuned with: a deep signal ring
/// for burst traffic, a shallow event ring, ~1 ms worker tick sleep and
/// 10 000-point online series.

use serde::{Deserialize, Serialize};

use crate::queue::{EVENT_QUEUE_CAPACITY, SIGNAL_QUEUE_CAPACITY};
use crate::scripting::sandbox::TrustLevel;
use crate::signals::PlaybackMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptHostConfig {
    /// Slot count of each worker's outbound signal ring.
    pub signal_queue_capacity: usize,
    /// Slot count of each worker's outbound UI event ring.
    pub event_queue_capacity: usize,
    /// Upper bound on the worker loop's anti-spin sleep, in milliseconds.
    pub tick_sleep_ms: u64,
    /// Capacity of series created on first use by the drain step.
    pub signal_max_points: usize,
    /// Mode for series created on first use by the drain step.
    pub default_playback_mode: PlaybackMode,
    /// Lua stdlib surface granted to worker VMs.
    pub trust_level: TrustLevel,
}

impl Default for ScriptHostConfig {
    fn default() -> Self {
        Self {
            signal_queue_capacity: SIGNAL_QUEUE_CAPACITY,
            event_queue_capacity: EVENT_QUEUE_CAPACITY,
            tick_sleep_ms: 1,
            signal_max_points: 10_000,
            default_playback_mode: PlaybackMode::Online,
            trust_level: TrustLevel::Basic,
        }
    }
}

impl ScriptHostConfig {
    pub fn from_json_str(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid script host config: {e}"))
    }

    pub fn from_json_file(path: &str) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {path}: {e}"))?;
        Self::from_json_str(&raw)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
