//! Grammar adapters: the seam between the resolver and each recurrence
//! grammar's evaluator.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use rq_domain::{Grammar, TriggerError};

use crate::cron::{CronError, CronExpr};
use crate::rrule::RecurrenceSet;

/// Result of asking a grammar for its next occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    At(DateTime<Utc>),
    /// The pattern has no occurrence after the given instant.
    NoMore,
}

/// Computes the first occurrence of a pattern strictly after an instant.
///
/// Implementations are pure: identical inputs give identical outputs, and
/// `At(t)` always satisfies `t > after`.
pub trait GrammarAdapter: Send + Sync {
    /// Parse `pattern` without evaluating it.
    fn check(&self, pattern: &str, tz: Tz) -> Result<(), TriggerError>;

    fn next_occurrence(
        &self,
        pattern: &str,
        after: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Occurrence, TriggerError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cron
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Clone, Copy)]
pub struct CronAdapter;

impl CronAdapter {
    fn parse(&self, pattern: &str) -> Result<CronExpr, TriggerError> {
        CronExpr::parse(pattern).map_err(|e| match e {
            CronError::Unsupported(_) => TriggerError::UnsupportedPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            },
            other => TriggerError::invalid(Grammar::Cron, other.to_string()),
        })
    }
}

impl GrammarAdapter for CronAdapter {
    fn check(&self, pattern: &str, _tz: Tz) -> Result<(), TriggerError> {
        self.parse(pattern).map(|_| ())
    }

    fn next_occurrence(
        &self,
        pattern: &str,
        after: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Occurrence, TriggerError> {
        let expr = self.parse(pattern)?;
        Ok(expr
            .next_after(&after, &tz)
            .map_or(Occurrence::NoMore, Occurrence::At))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RRULE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Clone, Copy)]
pub struct RRuleAdapter;

impl RRuleAdapter {
    fn parse(&self, pattern: &str, tz: Tz) -> Result<RecurrenceSet, TriggerError> {
        RecurrenceSet::parse(pattern, tz).map_err(|e| TriggerError::invalid(Grammar::Rrule, e.to_string()))
    }
}

impl GrammarAdapter for RRuleAdapter {
    fn check(&self, pattern: &str, tz: Tz) -> Result<(), TriggerError> {
        self.parse(pattern, tz).map(|_| ())
    }

    fn next_occurrence(
        &self,
        pattern: &str,
        after: DateTime<Utc>,
        tz: Tz,
    ) -> Result<Occurrence, TriggerError> {
        let set = self.parse(pattern, tz)?;
        Ok(set
            .next_after(after)
            .map_or(Occurrence::NoMore, Occurrence::At))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cron_adapter_next() {
        let after = Utc.with_ymd_and_hms(2025, 7, 22, 0, 0, 0).unwrap();
        let got = CronAdapter
            .next_occurrence("0 13 * * *", after, chrono_tz::UTC)
            .unwrap();
        assert_eq!(
            got,
            Occurrence::At(Utc.with_ymd_and_hms(2025, 7, 22, 13, 0, 0).unwrap())
        );
    }

    #[test]
    fn cron_adapter_reports_no_more() {
        let after = Utc.with_ymd_and_hms(2025, 7, 22, 0, 0, 0).unwrap();
        let got = CronAdapter
            .next_occurrence("0 0 31 4 *", after, chrono_tz::UTC)
            .unwrap();
        assert_eq!(got, Occurrence::NoMore);
    }

    #[test]
    fn cron_adapter_error_kinds() {
        let err = CronAdapter.check("61 * * * *", chrono_tz::UTC).unwrap_err();
        assert_eq!(
            err,
            TriggerError::invalid(Grammar::Cron, "minute: value 61 out of range 0..=59")
        );
        let err = CronAdapter.check("@reboot", chrono_tz::UTC).unwrap_err();
        assert!(matches!(err, TriggerError::UnsupportedPattern { .. }));
    }

    #[test]
    fn rrule_adapter_next_and_exhaustion() {
        let pattern = "DTSTART:20250722T130000Z\nRRULE:FREQ=DAILY;COUNT=1";
        let after = Utc.with_ymd_and_hms(2025, 7, 22, 0, 0, 0).unwrap();
        let first = Utc.with_ymd_and_hms(2025, 7, 22, 13, 0, 0).unwrap();
        assert_eq!(
            RRuleAdapter.next_occurrence(pattern, after, chrono_tz::UTC).unwrap(),
            Occurrence::At(first)
        );
        assert_eq!(
            RRuleAdapter.next_occurrence(pattern, first, chrono_tz::UTC).unwrap(),
            Occurrence::NoMore
        );
    }

    #[test]
    fn rrule_adapter_error_names_grammar() {
        let err = RRuleAdapter
            .check("RRULE:FREQ=DAILY", chrono_tz::UTC)
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid rrule pattern: DTSTART is required");
    }
}
