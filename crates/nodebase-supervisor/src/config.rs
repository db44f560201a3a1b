//! Supervisor tuning knobs.

use serde::Deserialize;
use std::time::Duration;

/// Settings injected into a [`crate::ProcessRegistry`].
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// How long a stopped process gets to exit before it is killed by PID.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl SupervisorConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn with_grace_period(grace: Duration) -> Self {
        Self {
            grace_period_ms: grace.as_millis() as u64,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

fn default_grace_period_ms() -> u64 {
    1000
}
