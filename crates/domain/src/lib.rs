//! Shared data model for repeatq: repeat specifications, trigger decisions,
//! per-job schedule state, the error taxonomy and configuration.

pub mod config;
pub mod error;
pub mod repeat;
pub mod schedule;

pub use error::{Error, Grammar, Result, TriggerError};
pub use repeat::{RepeatSpec, TriggerDecision, UTC_TIMEZONE};
pub use schedule::{JobScheduleState, MissedPolicy, ScheduleStatus};
