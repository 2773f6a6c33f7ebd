use chrono::{DateTime, Utc};
use serde::Serialize;

use rq_domain::ScheduleStatus;

use crate::job::{JobHandle, JobView};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler events (broadcast)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    JobEnqueued {
        job: JobView,
    },
    JobFired {
        job_id: JobHandle,
        sequence: u64,
        scheduled_for: DateTime<Utc>,
        immediate: bool,
    },
    HandlerFailed {
        job_id: JobHandle,
        sequence: u64,
        error: String,
    },
    /// The job is waiting for a new trigger.
    JobScheduled {
        job_id: JobHandle,
        next_run_at: DateTime<Utc>,
    },
    /// The job reached a terminal status.
    JobFinished {
        job_id: JobHandle,
        status: ScheduleStatus,
        error: Option<String>,
    },
    JobRemoved {
        job_id: JobHandle,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = SchedulerEvent::JobFinished {
            job_id: JobHandle::new(),
            status: ScheduleStatus::Exhausted,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_finished");
        assert_eq!(json["status"], "exhausted");
    }
}
