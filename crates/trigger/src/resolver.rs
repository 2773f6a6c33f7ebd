//! Trigger resolver: picks the grammar adapter for a pattern, applies the
//! immediate override and the `start_date` anchor, and returns one decision.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use rq_domain::{Grammar, RepeatSpec, TriggerDecision, TriggerError, UTC_TIMEZONE};

use crate::adapter::{CronAdapter, GrammarAdapter, Occurrence, RRuleAdapter};
use crate::classify::classify;

/// Repeat specs are always evaluated in UTC.
const EVALUATION_TZ: Tz = chrono_tz::UTC;

/// Stateless and `Send + Sync`; one instance can serve every job.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerResolver {
    cron: CronAdapter,
    rrule: RRuleAdapter,
}

impl TriggerResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn adapter(&self, grammar: Grammar) -> &dyn GrammarAdapter {
        match grammar {
            Grammar::Cron => &self.cron,
            Grammar::Rrule => &self.rrule,
        }
    }

    /// Classify and parse `pattern`, returning its grammar.
    pub fn check_pattern(&self, pattern: &str) -> Result<Grammar, TriggerError> {
        let grammar = classify(pattern)?;
        self.adapter(grammar).check(pattern, EVALUATION_TZ)?;
        Ok(grammar)
    }

    /// Fail-fast validation run when a job is enqueued. Returns the pattern's
    /// grammar, or `None` for a spec without a pattern.
    pub fn validate(&self, spec: &RepeatSpec) -> Result<Option<Grammar>, TriggerError> {
        if spec.timezone != UTC_TIMEZONE {
            return Err(TriggerError::UnsupportedTimezone(spec.timezone.clone()));
        }
        if let (Some(start), Some(end)) = (spec.start_date, spec.end_date) {
            if end < start {
                return Err(TriggerError::InvalidRepeatSpec(format!(
                    "end_date {end} is before start_date {start}"
                )));
            }
        }
        if spec.limit == Some(0) {
            return Err(TriggerError::InvalidRepeatSpec(
                "limit must be greater than 0".into(),
            ));
        }
        spec.pattern
            .as_deref()
            .map(|p| self.check_pattern(p))
            .transpose()
    }

    /// Compute the next trigger for `spec` from `reference`.
    ///
    /// Pure: the same `(spec, reference, immediate_consumed)` always yields
    /// the same decision.
    pub fn resolve(
        &self,
        spec: &RepeatSpec,
        reference: DateTime<Utc>,
        immediate_consumed: bool,
    ) -> Result<TriggerDecision, TriggerError> {
        let Some(pattern) = spec.pattern.as_deref() else {
            return Ok(TriggerDecision::NoRecurrence);
        };
        let grammar = classify(pattern)?;
        let adapter = self.adapter(grammar);

        if spec.immediate && !immediate_consumed {
            // Bad patterns must still fail on the immediate path.
            adapter.check(pattern, EVALUATION_TZ)?;
            return Ok(TriggerDecision::Fire {
                at: reference,
                immediate: true,
            });
        }

        let anchor = spec.anchor(reference);
        match adapter.next_occurrence(pattern, anchor, EVALUATION_TZ)? {
            Occurrence::At(at) => Ok(TriggerDecision::Fire {
                at,
                immediate: false,
            }),
            Occurrence::NoMore => Ok(TriggerDecision::Exhausted),
        }
    }
}
