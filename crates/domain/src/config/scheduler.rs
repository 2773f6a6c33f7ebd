use serde::{Deserialize, Serialize};

use crate::schedule::MissedPolicy;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduling loop configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings for the scheduling loop, passed to the scheduler at
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How windows missed while a job's loop was behind are handled.
    #[serde(default)]
    pub missed_policy: MissedPolicy,

    /// Capacity of the scheduler event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How long `shutdown` waits for job loops to exit before giving up.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            missed_policy: MissedPolicy::default(),
            event_buffer: default_event_buffer(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Clamp `event_buffer` to at least 1 (broadcast channels reject 0).
    pub fn clamped(&self) -> Self {
        Self {
            event_buffer: self.event_buffer.max(1),
            ..self.clone()
        }
    }
}

fn default_event_buffer() -> usize {
    64
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}
