//! Activity feed configuration.

use std::time::Duration;

use serde::Deserialize;

use super::mapping::UnscopedRunPolicy;

/// Tunables for the activity feed and its engine.
///
/// Mirrors the `activity` section of `colony-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActivityConfig {
    /// Lifetime of a swarm event in milliseconds.
    #[serde(default = "default_event_ttl_ms")]
    pub event_ttl_ms: u64,

    /// Lifetime of a ripple in milliseconds.
    #[serde(default = "default_ripple_ttl_ms")]
    pub ripple_ttl_ms: u64,

    /// Maximum number of live events; the oldest are dropped first.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Interval between expiry sweeps in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// How task-run messages without a room id are attributed.
    #[serde(default)]
    pub unscoped_runs: UnscopedRunPolicy,

    /// Generate synthetic events for demos.
    #[serde(default)]
    pub simulate: bool,
}

impl ActivityConfig {
    /// Event lifetime as a [`Duration`].
    pub const fn event_ttl(&self) -> Duration {
        Duration::from_millis(self.event_ttl_ms)
    }

    /// Ripple lifetime as a [`Duration`].
    pub const fn ripple_ttl(&self) -> Duration {
        Duration::from_millis(self.ripple_ttl_ms)
    }

    /// Sweep interval as a [`Duration`].
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            event_ttl_ms: default_event_ttl_ms(),
            ripple_ttl_ms: default_ripple_ttl_ms(),
            capacity: default_capacity(),
            sweep_interval_ms: default_sweep_interval_ms(),
            unscoped_runs: UnscopedRunPolicy::default(),
            simulate: false,
        }
    }
}

const fn default_event_ttl_ms() -> u64 {
    5_000
}

const fn default_ripple_ttl_ms() -> u64 {
    1_200
}

const fn default_capacity() -> usize {
    20
}

const fn default_sweep_interval_ms() -> u64 {
    1_000
}
