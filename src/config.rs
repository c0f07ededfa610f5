//! Controller configuration

use crate::engine::OutputSpec;
use serde::Deserialize;

/// Playlist controller configuration
///
/// Every field has a default, so `PlaylistConfig::default()` matches the
/// documented behaviour: 300 ms crossfades into a 640×480 / 48 kHz stereo
/// output, a one-second grace delay before standalone nodes are torn down,
/// and a 10 ms arm delay between republishing subscriptions and issuing a
/// switch command.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Crossfade duration applied by the smooth switcher
    pub transition_duration_ms: u64,

    /// Switcher output format
    pub output: OutputSpec,

    /// Delay between releasing a standalone input node and actually closing
    /// it, so the outgoing side of a crossfade can drain without a glitch
    pub close_grace_ms: u64,

    /// Delay between marking a pin active and commanding the switch, so the
    /// refreshed subscription set lands in the switcher first
    pub switch_arm_delay_ms: u64,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            transition_duration_ms: 300,
            output: OutputSpec::default(),
            close_grace_ms: 1_000,
            switch_arm_delay_ms: 10,
        }
    }
}
