//! Scheduler: the job table, per-job wait loops and the event broadcast.
//!
//! Every job owns a [`RecurrenceMachine`] stored in the table behind a
//! `parking_lot::RwLock`. Once a handler is attached with
//! [`Scheduler::on_due`], a tokio task waits for the job's trigger on the
//! injected [`Clock`], fires it, hands the firing to the handler and
//! acknowledges the outcome. The lock is only taken between awaits, and
//! never while a pattern is being resolved: transitions that resolve the
//! next trigger run on a checked-out copy of the machine that is committed
//! back only if the slot did not change meanwhile.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use rq_domain::config::SchedulerConfig;
use rq_domain::{Error, RepeatSpec, Result, ScheduleStatus, TriggerError};
use rq_trigger::{FireOutcome, RecurrenceMachine, TriggerResolver};

use crate::clock::Clock;
use crate::event::SchedulerEvent;
use crate::handler::{Firing, FiringHandler};
use crate::job::{JobHandle, JobSlot, JobView};

/// Owns every repeatable job. Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    resolver: TriggerResolver,
    jobs: RwLock<HashMap<JobHandle, JobSlot>>,
    events: broadcast::Sender<SchedulerEvent>,
    /// Parent of every job's cancellation token.
    shutdown: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.clamped();
        let (events, _) = broadcast::channel(config.event_buffer);
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                resolver: TriggerResolver::new(),
                jobs: RwLock::new(HashMap::new()),
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    // ── Job lifecycle ─────────────────────────────────────────────────

    /// Validate `spec`, resolve the job's first trigger and register it.
    ///
    /// Pattern errors surface here; nothing is registered for a bad spec.
    pub fn enqueue_repeatable(
        &self,
        name: impl Into<String>,
        payload: serde_json::Value,
        spec: RepeatSpec,
    ) -> Result<JobHandle> {
        self.ensure_running()?;
        let name = name.into();
        let grammar = self.inner.resolver.validate(&spec)?;

        let now = self.inner.clock.now();
        let mut machine =
            RecurrenceMachine::new(spec, now).with_missed_policy(self.inner.config.missed_policy);
        machine.advance()?;

        let handle = JobHandle::new();
        let slot = JobSlot {
            name,
            payload,
            machine,
            revision: 0,
            created_at: now,
            cancel: self.inner.shutdown.child_token(),
            changed: Arc::new(Notify::new()),
            task: None,
        };
        let view = slot.to_view(handle);
        self.inner.jobs.write().insert(handle, slot);

        tracing::info!(
            job = %handle,
            name = %view.name,
            grammar = ?grammar,
            status = %view.status,
            next_run_at = ?view.next_run_at,
            "job enqueued"
        );
        self.inner.emit(SchedulerEvent::JobEnqueued { job: view });
        Ok(handle)
    }

    /// Attach `handler` and start the job's wait loop. A job accepts one
    /// handler for its lifetime.
    pub fn on_due(&self, handle: JobHandle, handler: Arc<dyn FiringHandler>) -> Result<()> {
        self.ensure_running()?;
        let mut jobs = self.inner.jobs.write();
        let slot = jobs
            .get_mut(&handle)
            .ok_or_else(|| Error::JobNotFound(handle.to_string()))?;
        if slot.task.is_some() {
            return Err(Error::HandlerAttached(handle.to_string()));
        }

        let worker = JobLoop {
            inner: Arc::downgrade(&self.inner),
            clock: self.inner.clock.clone(),
            handle,
            handler,
            cancel: slot.cancel.clone(),
            changed: slot.changed.clone(),
        };
        let span = tracing::info_span!("job_loop", job = %handle, name = %slot.name);
        slot.task = Some(tokio::spawn(worker.run().instrument(span)));
        Ok(())
    }

    /// Stop the job's loop and drop its state. Returns `false` for an
    /// unknown handle.
    pub fn remove_job(&self, handle: JobHandle) -> bool {
        let Some(slot) = self.inner.jobs.write().remove(&handle) else {
            return false;
        };
        slot.cancel.cancel();
        tracing::info!(job = %handle, name = %slot.name, "job removed");
        self.inner.emit(SchedulerEvent::JobRemoved { job_id: handle });
        true
    }

    /// Re-resolve a pending job from `reference` (default: now). Triggers
    /// never move backwards; the immediate override fires again only when
    /// `rearm_immediate` is set. Fired and finished jobs are refused with
    /// [`TriggerError::InvalidTransition`].
    pub fn reschedule(
        &self,
        handle: JobHandle,
        reference: Option<DateTime<Utc>>,
        rearm_immediate: bool,
    ) -> Result<JobView> {
        let reference = reference.unwrap_or_else(|| self.inner.clock.now());
        loop {
            let (mut machine, revision) = self
                .inner
                .jobs
                .read()
                .get(&handle)
                .map(JobSlot::checkout)
                .ok_or_else(|| Error::JobNotFound(handle.to_string()))?;

            let result = match machine.reschedule(reference, rearm_immediate) {
                Err(e @ TriggerError::InvalidTransition { .. }) => return Err(e.into()),
                other => other,
            };

            let mut jobs = self.inner.jobs.write();
            let slot = jobs
                .get_mut(&handle)
                .ok_or_else(|| Error::JobNotFound(handle.to_string()))?;
            if !slot.commit(machine, revision) {
                // The loop fired or acknowledged meanwhile; start over.
                continue;
            }
            slot.changed.notify_one();
            let view = slot.to_view(handle);
            let event = status_event(handle, slot);
            drop(jobs);

            if let Some(event) = event {
                self.inner.emit(event);
            }
            result?;
            tracing::info!(
                job = %handle,
                reference = %reference,
                rearm_immediate,
                next_run_at = ?view.next_run_at,
                "job rescheduled"
            );
            return Ok(view);
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn get(&self, handle: JobHandle) -> Option<JobView> {
        self.inner
            .jobs
            .read()
            .get(&handle)
            .map(|slot| slot.to_view(handle))
    }

    /// Every job, oldest first.
    pub fn list(&self) -> Vec<JobView> {
        let mut views: Vec<JobView> = self
            .inner
            .jobs
            .read()
            .iter()
            .map(|(handle, slot)| slot.to_view(*handle))
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        views
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    // ── Shutdown ──────────────────────────────────────────────────────

    /// Cancel every job loop and wait up to `shutdown_grace_ms` for them to
    /// exit. Loops still running after the grace period are aborted.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let tasks: Vec<_> = self
            .inner
            .jobs
            .write()
            .values_mut()
            .filter_map(|slot| slot.task.take())
            .collect();

        let grace = Duration::from_millis(self.inner.config.shutdown_grace_ms);
        let deadline = tokio::time::Instant::now() + grace;
        let total = tasks.len();
        let mut aborted = 0usize;
        for mut task in tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
                aborted += 1;
            }
        }
        tracing::info!(loops = total, aborted, "scheduler stopped");
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            Err(Error::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

impl Inner {
    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn due_at(&self, handle: JobHandle) -> Option<DateTime<Utc>> {
        self.jobs
            .read()
            .get(&handle)
            .and_then(|slot| slot.machine.due_at())
    }

    /// Fire the job if its trigger has been reached.
    fn fire(&self, handle: JobHandle) -> Option<Firing> {
        let now = self.clock.now();
        let mut jobs = self.jobs.write();
        let slot = jobs.get_mut(&handle)?;
        if !slot.machine.due_at().is_some_and(|due| due <= now) {
            return None;
        }
        let ticket = match slot.machine.fire(now) {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::warn!(job = %handle, error = %e, "fire rejected");
                return None;
            }
        };
        slot.revision += 1;
        let firing = Firing {
            job_id: handle,
            name: slot.name.clone(),
            payload: slot.payload.clone(),
            scheduled_for: ticket.scheduled_for,
            fired_at: now,
            sequence: ticket.sequence,
            immediate: ticket.immediate,
        };
        drop(jobs);

        tracing::debug!(
            job = %handle,
            sequence = firing.sequence,
            scheduled_for = %firing.scheduled_for,
            immediate = firing.immediate,
            "trigger reached"
        );
        self.emit(SchedulerEvent::JobFired {
            job_id: handle,
            sequence: firing.sequence,
            scheduled_for: firing.scheduled_for,
            immediate: firing.immediate,
        });
        Some(firing)
    }

    fn acknowledge(&self, handle: JobHandle, outcome: FireOutcome) {
        let now = self.clock.now();
        // Removed while the handler ran.
        let Some((mut machine, revision)) = self.jobs.read().get(&handle).map(JobSlot::checkout)
        else {
            return;
        };
        let result = machine.acknowledge(outcome, now);

        let mut jobs = self.jobs.write();
        let Some(slot) = jobs.get_mut(&handle) else {
            return;
        };
        if !slot.commit(machine, revision) {
            tracing::warn!(job = %handle, "job changed while its firing was acknowledged");
            return;
        }
        let event = status_event(handle, slot);
        drop(jobs);

        if let Err(e) = result {
            tracing::warn!(job = %handle, error = %e, "job stopped while resolving its next trigger");
        }
        if let Some(event) = event {
            self.emit(event);
        }
    }
}

/// The event describing where a job stands after a transition.
fn status_event(handle: JobHandle, slot: &JobSlot) -> Option<SchedulerEvent> {
    let state = slot.machine.state();
    match state.status {
        ScheduleStatus::Pending => {
            let next_run_at = state.next_trigger?;
            tracing::debug!(job = %handle, next_run_at = %next_run_at, "next trigger resolved");
            Some(SchedulerEvent::JobScheduled {
                job_id: handle,
                next_run_at,
            })
        }
        status if status.is_terminal() => {
            tracing::info!(
                job = %handle,
                status = %status,
                fire_count = state.fire_count,
                "job finished"
            );
            Some(SchedulerEvent::JobFinished {
                job_id: handle,
                status,
                error: state.last_error.clone(),
            })
        }
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-job wait loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct JobLoop {
    inner: Weak<Inner>,
    clock: Arc<dyn Clock>,
    handle: JobHandle,
    handler: Arc<dyn FiringHandler>,
    cancel: CancellationToken,
    changed: Arc<Notify>,
}

impl JobLoop {
    async fn run(self) {
        loop {
            let changed = self.changed.notified();
            let Some(due) = self.inner.upgrade().and_then(|inner| inner.due_at(self.handle)) else {
                tracing::debug!("no pending trigger; job loop exiting");
                return;
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("job loop cancelled");
                    return;
                }
                _ = changed => continue,
                _ = self.clock.sleep_until(due) => {}
            }

            let Some(firing) = self.inner.upgrade().and_then(|inner| inner.fire(self.handle)) else {
                continue;
            };
            let outcome = self.hand_off(firing).await;
            match self.inner.upgrade() {
                Some(inner) => inner.acknowledge(self.handle, outcome),
                None => return,
            }
        }
    }

    /// Run the handler on its own task so a panic is recorded as a failure
    /// instead of taking the loop down.
    async fn hand_off(&self, firing: Firing) -> FireOutcome {
        let handler = self.handler.clone();
        let sequence = firing.sequence;
        let joined = tokio::spawn(async move { handler.on_fire(&firing).await }).await;

        let error = match joined {
            Ok(Ok(())) => return FireOutcome::Succeeded,
            Ok(Err(e)) => format!("{e:#}"),
            Err(e) if e.is_panic() => "handler panicked".to_string(),
            Err(_) => "handler task was cancelled".to_string(),
        };
        tracing::warn!(sequence, error = %error, "firing handler failed");
        if let Some(inner) = self.inner.upgrade() {
            inner.emit(SchedulerEvent::HandlerFailed {
                job_id: self.handle,
                sequence,
                error: error.clone(),
            });
        }
        FireOutcome::Failed(error)
    }
}
