use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleStatus;

/// The recurrence grammar a pattern was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grammar {
    Cron,
    Rrule,
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron => f.write_str("cron"),
            Self::Rrule => f.write_str("rrule"),
        }
    }
}

/// Failures raised while classifying, parsing or resolving a repeat pattern,
/// and consistency violations detected by the recurrence state machine.
///
/// Running out of occurrences is not an error; adapters report it as a
/// normal terminal outcome.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("unrecognized pattern {pattern:?}: neither a cron expression nor an RRULE set")]
    UnrecognizedPattern { pattern: String },

    #[error("invalid {grammar} pattern: {reason}")]
    InvalidPattern { grammar: Grammar, reason: String },

    #[error("unsupported pattern {pattern:?}: {reason}")]
    UnsupportedPattern { pattern: String, reason: String },

    #[error("unsupported timezone {0:?}: repeat specs are evaluated in UTC")]
    UnsupportedTimezone(String),

    #[error("invalid repeat spec: {0}")]
    InvalidRepeatSpec(String),

    #[error("non-monotonic trigger: resolved {resolved} is earlier than last trigger {last}")]
    NonMonotonicTrigger {
        last: DateTime<Utc>,
        resolved: DateTime<Utc>,
    },

    #[error("cannot {action} a job that is {status}")]
    InvalidTransition {
        status: ScheduleStatus,
        action: &'static str,
    },
}

impl TriggerError {
    pub fn invalid(grammar: Grammar, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            grammar,
            reason: reason.into(),
        }
    }

    /// True for failures caused by the pattern text itself. These are fatal
    /// for the job and surface to whoever enqueued it.
    pub fn is_pattern_error(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedPattern { .. }
                | Self::InvalidPattern { .. }
                | Self::UnsupportedPattern { .. }
        )
    }
}

/// Top-level error for the scheduler surface.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {0} already has a firing handler attached")]
    HandlerAttached(String),

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, Error>;
