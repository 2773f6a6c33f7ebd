mod jobs;
mod observability;
mod scheduler;

pub use jobs::*;
pub use observability::*;
pub use scheduler::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::repeat::UTC_TIMEZONE;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Repeatable jobs enqueued when the scheduler starts.
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Structural validation. Pattern grammar is checked by the trigger
    /// resolver, which this crate does not depend on.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.scheduler.event_buffer == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.event_buffer".into(),
                message: "event_buffer must be greater than 0".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample_rate must be within 0.0..=1.0".into(),
            });
        }

        if self.jobs.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "jobs".into(),
                message: "no jobs configured; the scheduler will idle".into(),
            });
        }

        let mut seen = HashSet::new();
        for (i, job) in self.jobs.iter().enumerate() {
            if job.name.trim().is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("jobs[{i}].name"),
                    message: "job name must not be empty".into(),
                });
            } else if !seen.insert(job.name.as_str()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("jobs[{i}].name"),
                    message: format!("duplicate job name '{}'", job.name),
                });
            }

            let repeat = &job.repeat;
            if repeat.timezone != UTC_TIMEZONE {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("jobs[{i}].repeat.timezone"),
                    message: format!("timezone must be \"UTC\", got '{}'", repeat.timezone),
                });
            }
            if let (Some(start), Some(end)) = (repeat.start_date, repeat.end_date) {
                if end < start {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("jobs[{i}].repeat.end_date"),
                        message: "end_date is before start_date".into(),
                    });
                }
            }
            if repeat.limit == Some(0) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("jobs[{i}].repeat.limit"),
                    message: "limit must be greater than 0".into(),
                });
            }
            if repeat.pattern.is_none() && repeat.immediate {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("jobs[{i}].repeat.immediate"),
                    message: "immediate has no effect without a pattern".into(),
                });
            }
        }

        errors
    }
}
