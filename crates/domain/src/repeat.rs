//! Repeat specification and the resolver's output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The only timezone repeat specs are evaluated in.
pub const UTC_TIMEZONE: &str = "UTC";

fn default_timezone() -> String {
    UTC_TIMEZONE.to_string()
}

/// How a job recurs. Immutable once the job has been enqueued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatSpec {
    /// A cron expression or a multi-line RRULE set (`DTSTART` + `RRULE`...).
    #[serde(default)]
    pub pattern: Option<String>,
    /// Fire the first trigger at the reference time, bypassing the pattern
    /// for that single occurrence.
    #[serde(default, alias = "immediately")]
    pub immediate: bool,
    /// Earliest instant recurrence may begin.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Triggers after this instant exhaust the recurrence.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Maximum number of firings.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Fixed at "UTC".
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for RepeatSpec {
    fn default() -> Self {
        Self {
            pattern: None,
            immediate: false,
            start_date: None,
            end_date: None,
            limit: None,
            timezone: default_timezone(),
        }
    }
}

impl RepeatSpec {
    /// A recurring spec driven by `pattern`.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// A spec without a pattern: the job runs once.
    pub fn once() -> Self {
        Self::default()
    }

    pub fn immediately(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self
    }

    pub fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The instant evaluation starts from: `start_date` when it lies after
    /// `reference`, otherwise `reference`.
    pub fn anchor(&self, reference: DateTime<Utc>) -> DateTime<Utc> {
        match self.start_date {
            Some(start) if start > reference => start,
            _ => reference,
        }
    }
}

/// Output of the trigger resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerDecision {
    /// Fire at `at`. `immediate` is set when the immediate override
    /// produced the decision.
    Fire { at: DateTime<Utc>, immediate: bool },
    /// The repeat spec has no pattern.
    NoRecurrence,
    /// The pattern has no further occurrences.
    Exhausted,
}

impl TriggerDecision {
    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Fire { at, .. } => Some(*at),
            Self::NoRecurrence | Self::Exhausted => None,
        }
    }

    /// The trigger as milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.at().map(|at| at.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_are_utc_and_not_immediate() {
        let spec = RepeatSpec::default();
        assert!(spec.pattern.is_none());
        assert!(!spec.immediate);
        assert_eq!(spec.timezone, "UTC");
    }

    #[test]
    fn anchor_prefers_future_start_date() {
        let reference = Utc.with_ymd_and_hms(2025, 7, 22, 0, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();
        let spec = RepeatSpec::pattern("0 13 * * *").starting_at(start);
        assert_eq!(spec.anchor(reference), start);

        let past = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let spec = RepeatSpec::pattern("0 13 * * *").starting_at(past);
        assert_eq!(spec.anchor(reference), reference);
    }

    #[test]
    fn deserializes_immediately_alias() {
        let json = serde_json::json!({
            "pattern": "@daily",
            "immediately": true,
        });
        let spec: RepeatSpec = serde_json::from_value(json).unwrap();
        assert!(spec.immediate);
        assert_eq!(spec.timezone, "UTC");
        assert!(spec.limit.is_none());
    }

    #[test]
    fn decision_millis() {
        let at = Utc.with_ymd_and_hms(2025, 7, 22, 13, 0, 0).unwrap();
        let decision = TriggerDecision::Fire {
            at,
            immediate: false,
        };
        assert_eq!(decision.timestamp_millis(), Some(1_753_189_200_000));
        assert_eq!(TriggerDecision::Exhausted.timestamp_millis(), None);
    }
}
