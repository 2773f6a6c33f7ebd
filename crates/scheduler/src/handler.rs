//! Firing hand-off: what a job's handler receives when its trigger comes due.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::JobHandle;

/// One firing of a repeatable job.
#[derive(Debug, Clone, Serialize)]
pub struct Firing {
    pub job_id: JobHandle,
    pub name: String,
    pub payload: serde_json::Value,
    /// The trigger that came due.
    pub scheduled_for: DateTime<Utc>,
    /// When the loop actually fired it.
    pub fired_at: DateTime<Utc>,
    /// 1-based firing number.
    pub sequence: u64,
    pub immediate: bool,
}

/// Receives firings for a job.
///
/// An `Err` (or a panic) is recorded as a failed hand-off on the job; the
/// recurrence continues either way.
#[async_trait::async_trait]
pub trait FiringHandler: Send + Sync {
    async fn on_fire(&self, firing: &Firing) -> anyhow::Result<()>;
}

/// Logs each firing. Used by `repeatq serve` for jobs declared in config.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

#[async_trait::async_trait]
impl FiringHandler for LogHandler {
    async fn on_fire(&self, firing: &Firing) -> anyhow::Result<()> {
        tracing::info!(
            job = %firing.job_id,
            name = %firing.name,
            sequence = firing.sequence,
            scheduled_for = %firing.scheduled_for,
            immediate = firing.immediate,
            payload = %firing.payload,
            "job fired"
        );
        Ok(())
    }
}
