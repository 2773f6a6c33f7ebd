//! Per-job scheduling state owned by the recurrence state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Waiting for the next trigger.
    Pending,
    /// Trigger reached, awaiting acknowledgement of the hand-off.
    Fired,
    /// A one-shot job (or one that hit its firing limit) has finished.
    Completed,
    /// No further occurrences.
    Exhausted,
    /// The pattern failed to parse or an internal invariant was violated.
    Invalid,
}

impl ScheduleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Exhausted | Self::Invalid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fired => "fired",
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to windows that elapsed while the scheduling loop was behind.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissedPolicy {
    /// Resolve from the previous trigger, firing every missed window in turn.
    #[default]
    CatchUp,
    /// Resolve from the later of the previous trigger and the current time.
    Skip,
}

/// Mutable scheduling state for one job instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobScheduleState {
    pub status: ScheduleStatus,
    /// The instant the next resolution is computed from.
    pub reference_time: DateTime<Utc>,
    /// Set once the immediate override has produced a trigger.
    pub immediate_consumed: bool,
    /// Most recently resolved trigger. Never decreases.
    pub last_trigger: Option<DateTime<Utc>>,
    /// Trigger the job is currently waiting for (Pending only).
    pub next_trigger: Option<DateTime<Utc>>,
    /// The job has no pattern and fires exactly once.
    pub one_shot: bool,
    pub fire_count: u64,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl JobScheduleState {
    pub fn new(reference_time: DateTime<Utc>) -> Self {
        Self {
            status: ScheduleStatus::Pending,
            reference_time,
            immediate_consumed: false,
            last_trigger: None,
            next_trigger: None,
            one_shot: false,
            fire_count: 0,
            last_fired_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    /// The pending trigger, if the job is waiting for one.
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            ScheduleStatus::Pending => self.next_trigger,
            _ => None,
        }
    }
}
