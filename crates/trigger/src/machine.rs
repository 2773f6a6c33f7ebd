//! Per-job recurrence state machine.
//!
//! ```text
//! Pending --advance--> Pending (next trigger stored)
//! Pending --fire-----> Fired
//! Fired ---ack-------> Pending (advance) | Completed
//! Pending --advance--> Exhausted | Invalid | Completed
//! Pending --reschedule--> Pending | Exhausted | Invalid | Completed
//! ```
//!
//! `Completed`, `Exhausted` and `Invalid` are terminal.

use chrono::{DateTime, Utc};
use serde::Serialize;

use rq_domain::{
    JobScheduleState, MissedPolicy, RepeatSpec, ScheduleStatus, TriggerDecision, TriggerError,
};

use crate::resolver::TriggerResolver;

/// Handed to the scheduling loop when a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FiringTicket {
    /// The trigger that came due.
    pub scheduled_for: DateTime<Utc>,
    /// 1-based firing number for this job.
    pub sequence: u64,
    /// The trigger came from the immediate override.
    pub immediate: bool,
}

/// Result of handing a firing to the job's handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RecurrenceMachine {
    spec: RepeatSpec,
    state: JobScheduleState,
    resolver: TriggerResolver,
    missed_policy: MissedPolicy,
    /// Whether the pending trigger came from the immediate override.
    pending_immediate: bool,
}

impl RecurrenceMachine {
    pub fn new(spec: RepeatSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            spec,
            state: JobScheduleState::new(created_at),
            resolver: TriggerResolver::new(),
            missed_policy: MissedPolicy::default(),
            pending_immediate: false,
        }
    }

    pub fn with_missed_policy(mut self, policy: MissedPolicy) -> Self {
        self.missed_policy = policy;
        self
    }

    pub fn spec(&self) -> &RepeatSpec {
        &self.spec
    }

    pub fn state(&self) -> &JobScheduleState {
        &self.state
    }

    pub fn status(&self) -> ScheduleStatus {
        self.state.status
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.state.due_at()
    }

    // ── Transitions ───────────────────────────────────────────────────

    /// Resolve the next trigger from the current reference time.
    pub fn advance(&mut self) -> Result<ScheduleStatus, TriggerError> {
        self.expect_status(ScheduleStatus::Pending, "advance")?;

        if self
            .spec
            .limit
            .is_some_and(|limit| self.state.fire_count >= limit)
        {
            return Ok(self.finish(ScheduleStatus::Completed));
        }

        let decision = match self.resolver.resolve(
            &self.spec,
            self.state.reference_time,
            self.state.immediate_consumed,
        ) {
            Ok(decision) => decision,
            Err(e) => {
                if e.is_pattern_error() {
                    tracing::warn!(error = %e, "repeat pattern rejected");
                } else {
                    tracing::warn!(error = %e, "repeat spec could not be resolved");
                }
                self.state.last_error = Some(e.to_string());
                self.finish(ScheduleStatus::Invalid);
                return Err(e);
            }
        };

        match decision {
            TriggerDecision::Fire { at, immediate } => self.accept(at, immediate),
            TriggerDecision::NoRecurrence if self.state.fire_count == 0 => {
                self.state.one_shot = true;
                let at = self.spec.anchor(self.state.reference_time);
                self.accept(at, false)
            }
            TriggerDecision::NoRecurrence => Ok(self.finish(ScheduleStatus::Completed)),
            TriggerDecision::Exhausted => Ok(self.finish(ScheduleStatus::Exhausted)),
        }
    }

    /// The trigger came due. Call once the scheduling loop reaches
    /// [`due_at`](Self::due_at).
    pub fn fire(&mut self, now: DateTime<Utc>) -> Result<FiringTicket, TriggerError> {
        self.expect_status(ScheduleStatus::Pending, "fire")?;
        let scheduled_for = self.state.next_trigger.ok_or(TriggerError::InvalidTransition {
            status: self.state.status,
            action: "fire",
        })?;

        self.state.status = ScheduleStatus::Fired;
        self.state.fire_count += 1;
        self.state.last_fired_at = Some(now);
        Ok(FiringTicket {
            scheduled_for,
            sequence: self.state.fire_count,
            immediate: self.pending_immediate,
        })
    }

    /// Record the hand-off result and move on to the next trigger.
    pub fn acknowledge(
        &mut self,
        outcome: FireOutcome,
        now: DateTime<Utc>,
    ) -> Result<ScheduleStatus, TriggerError> {
        self.expect_status(ScheduleStatus::Fired, "acknowledge")?;

        match outcome {
            FireOutcome::Succeeded => {
                self.state.consecutive_failures = 0;
                self.state.last_error = None;
            }
            FireOutcome::Failed(error) => {
                self.state.consecutive_failures += 1;
                self.state.last_error = Some(error);
            }
        }

        if self.state.one_shot {
            return Ok(self.finish(ScheduleStatus::Completed));
        }

        self.state.status = ScheduleStatus::Pending;
        self.state.next_trigger = None;
        if self.missed_policy == MissedPolicy::Skip && now > self.state.reference_time {
            self.state.reference_time = now;
        }
        self.advance()
    }

    /// Manually reset a pending recurrence to resolve from `reference`.
    ///
    /// The reference is clamped to the last trigger so triggers never move
    /// backwards; a pending trigger at or after `reference` is kept as is.
    /// The immediate override fires again only when `rearm_immediate` is set.
    /// A fired job must be acknowledged first, and a finished one
    /// (`Completed`, `Exhausted`, `Invalid`) stays finished.
    pub fn reschedule(
        &mut self,
        reference: DateTime<Utc>,
        rearm_immediate: bool,
    ) -> Result<ScheduleStatus, TriggerError> {
        self.expect_status(ScheduleStatus::Pending, "reschedule")?;
        if let Some(last) = self.state.last_trigger {
            if reference <= last && !rearm_immediate && self.state.due_at() == Some(last) {
                return Ok(ScheduleStatus::Pending);
            }
        }
        self.state.reference_time = self
            .state
            .last_trigger
            .map_or(reference, |last| reference.max(last));
        if rearm_immediate {
            self.state.immediate_consumed = false;
        }
        self.state.next_trigger = None;
        self.advance()
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn expect_status(
        &self,
        expected: ScheduleStatus,
        action: &'static str,
    ) -> Result<(), TriggerError> {
        if self.state.status == expected {
            Ok(())
        } else {
            Err(TriggerError::InvalidTransition {
                status: self.state.status,
                action,
            })
        }
    }

    fn accept(&mut self, at: DateTime<Utc>, immediate: bool) -> Result<ScheduleStatus, TriggerError> {
        if let Some(last) = self.state.last_trigger {
            if at < last {
                tracing::error!(
                    last_trigger = %last,
                    resolved = %at,
                    "resolved trigger is earlier than the last one; marking job invalid"
                );
                let err = TriggerError::NonMonotonicTrigger { last, resolved: at };
                self.state.last_error = Some(err.to_string());
                self.finish(ScheduleStatus::Invalid);
                return Err(err);
            }
        }
        if self.spec.end_date.is_some_and(|end| at > end) {
            return Ok(self.finish(ScheduleStatus::Exhausted));
        }

        self.state.reference_time = at;
        self.state.last_trigger = Some(at);
        self.state.next_trigger = Some(at);
        if immediate {
            self.state.immediate_consumed = true;
        }
        self.pending_immediate = immediate;
        tracing::debug!(next_trigger = %at, immediate, "trigger resolved");
        Ok(ScheduleStatus::Pending)
    }

    fn finish(&mut self, status: ScheduleStatus) -> ScheduleStatus {
        self.state.status = status;
        self.state.next_trigger = None;
        self.pending_immediate = false;
        status
    }
}
