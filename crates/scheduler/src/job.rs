//! Job identity and the per-job slot held in the scheduler's table.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rq_domain::{RepeatSpec, ScheduleStatus};
use rq_trigger::RecurrenceMachine;

/// Opaque identifier returned by `enqueue_repeatable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(Uuid);

impl JobHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Read-only snapshot of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobHandle,
    pub name: String,
    pub payload: serde_json::Value,
    pub repeat: RepeatSpec,
    pub status: ScheduleStatus,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_trigger: Option<DateTime<Utc>>,
    pub immediate_consumed: bool,
    pub fire_count: u64,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub handler_attached: bool,
}

pub(crate) struct JobSlot {
    pub name: String,
    pub payload: serde_json::Value,
    pub machine: RecurrenceMachine,
    /// Bumped on every change to `machine`.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub cancel: CancellationToken,
    /// Wakes the job loop when its trigger changes outside the loop.
    pub changed: Arc<Notify>,
    pub task: Option<JoinHandle<()>>,
}

impl JobSlot {
    /// A copy of the machine to advance outside the table lock, with the
    /// revision it was taken at.
    pub fn checkout(&self) -> (RecurrenceMachine, u64) {
        (self.machine.clone(), self.revision)
    }

    /// Store a machine advanced from [`checkout`](Self::checkout). Refused
    /// when the slot changed in the meantime.
    pub fn commit(&mut self, machine: RecurrenceMachine, revision: u64) -> bool {
        if self.revision != revision {
            return false;
        }
        self.machine = machine;
        self.revision += 1;
        true
    }

    pub fn to_view(&self, id: JobHandle) -> JobView {
        let state = self.machine.state();
        JobView {
            id,
            name: self.name.clone(),
            payload: self.payload.clone(),
            repeat: self.machine.spec().clone(),
            status: state.status,
            next_run_at: state.due_at(),
            last_trigger: state.last_trigger,
            immediate_consumed: state.immediate_consumed,
            fire_count: state.fire_count,
            last_fired_at: state.last_fired_at,
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error.clone(),
            created_at: self.created_at,
            handler_attached: self.task.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_display_as_uuid() {
        let a = JobHandle::new();
        let b = JobHandle::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[test]
    fn handle_serializes_transparently() {
        let h = JobHandle::new();
        let json = serde_json::to_value(h).unwrap();
        assert_eq!(json, serde_json::Value::String(h.to_string()));
    }
}
