use std::iter::Peekable;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;

use super::parse::{parse_date_value, parse_property, parse_rule, DateValue, Property};
use super::rule::{Occurrences, Rule};
use super::RRuleError;

/// How far past the reference instant a run of excluded candidates may
/// reach before the set is treated as never producing again.
const EXCLUSION_HORIZON_YEARS: i64 = 8;

/// A parsed recurrence set.
///
/// The next occurrence is the earliest candidate produced by any `RRULE` or
/// `RDATE`. A candidate matched by an `EXDATE`, or produced at the same
/// instant by an `EXRULE`, is excluded even when an inclusion also yields it.
/// `DTSTART` only counts as an occurrence when a rule produces it.
#[derive(Debug, Clone)]
pub struct RecurrenceSet {
    dtstart: DateTime<Utc>,
    rules: Vec<Rule>,
    exrules: Vec<Rule>,
    rdates: Vec<DateTime<Utc>>,
    exdates: Vec<DateTime<Utc>>,
}

impl RecurrenceSet {
    /// Parse a multi-line set. Wall-clock values without a `TZID` are read
    /// in `default_zone`.
    pub fn parse(text: &str, default_zone: Tz) -> Result<Self, RRuleError> {
        let props = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(parse_property)
            .collect::<Result<Vec<Property<'_>>, _>>()?;

        let mut dtstarts = props.iter().filter(|p| p.name == "DTSTART");
        let start_prop = dtstarts.next().ok_or(RRuleError::MissingDtstart)?;
        if dtstarts.next().is_some() {
            return Err(RRuleError::DuplicateDtstart);
        }
        let zone = start_prop.tzid()?.unwrap_or(default_zone);
        let start_value = parse_date_value(start_prop.value)?;
        let dtstart_local: NaiveDateTime = start_value
            .to_local(zone)
            .ok_or_else(|| RRuleError::InvalidDate(start_prop.value.to_string()))?;
        let dtstart = start_value.to_instant(zone)?;

        let mut set = Self {
            dtstart,
            rules: Vec::new(),
            exrules: Vec::new(),
            rdates: Vec::new(),
            exdates: Vec::new(),
        };

        for prop in &props {
            match prop.name.as_str() {
                "RRULE" => set
                    .rules
                    .push(Rule::new(parse_rule(prop.value)?, dtstart_local, zone)?),
                "EXRULE" => set
                    .exrules
                    .push(Rule::new(parse_rule(prop.value)?, dtstart_local, zone)?),
                "RDATE" => set.rdates.extend(date_list(prop, zone)?),
                "EXDATE" => set.exdates.extend(date_list(prop, zone)?),
                _ => {}
            }
        }

        if set.rules.is_empty() && set.rdates.is_empty() {
            return Err(RRuleError::NoRecurrence);
        }
        set.rdates.sort();
        set.rdates.dedup();
        Ok(set)
    }

    pub fn dtstart(&self) -> DateTime<Utc> {
        self.dtstart
    }

    /// The first occurrence strictly after `after`, or `None` once the set
    /// is exhausted.
    ///
    /// Inclusions and exclusions are walked side by side from `after`, so a
    /// long excluded stretch costs one pass over its candidates. A stretch
    /// reaching more than eight years past `after` ends the search.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let horizon = after
            .checked_add_signed(Duration::days(366 * EXCLUSION_HORIZON_YEARS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut included: Vec<Peekable<Occurrences<'_>>> = self
            .rules
            .iter()
            .map(|r| r.occurrences(Some(after)).peekable())
            .collect();
        let mut excluded: Vec<Peekable<Occurrences<'_>>> = self
            .exrules
            .iter()
            .map(|r| r.occurrences(Some(after)).peekable())
            .collect();

        let mut cursor = after;
        loop {
            let from_rules = included
                .iter_mut()
                .filter_map(|it| {
                    while it.next_if(|t| *t <= cursor).is_some() {}
                    it.peek().copied()
                })
                .min();
            let from_dates = self.rdates.iter().copied().find(|d| *d > cursor);
            let candidate = from_rules.into_iter().chain(from_dates).min()?;

            let exruled = excluded.iter_mut().any(|it| {
                while it.next_if(|t| *t < candidate).is_some() {}
                it.peek() == Some(&candidate)
            });
            if !exruled && !self.exdates.contains(&candidate) {
                return Some(candidate);
            }
            if candidate > horizon {
                tracing::warn!(
                    after = %after,
                    excluded_through = %candidate,
                    "recurrence set excluded every candidate within {EXCLUSION_HORIZON_YEARS} years; treating as exhausted"
                );
                return None;
            }
            cursor = candidate;
        }
    }
}

/// Values of an `RDATE`/`EXDATE` line. Wall-clock values use the line's
/// `TZID`, falling back to the `DTSTART` zone.
fn date_list(prop: &Property<'_>, zone: Tz) -> Result<Vec<DateTime<Utc>>, RRuleError> {
    if prop
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("PERIOD"))
    {
        return Err(RRuleError::InvalidDate(format!("{}: PERIOD values", prop.name)));
    }
    let zone = prop.tzid()?.unwrap_or(zone);
    prop.value
        .split(',')
        .map(|v| parse_date_value(v.trim()).and_then(|d: DateValue| d.to_instant(zone)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn set(text: &str) -> RecurrenceSet {
        RecurrenceSet::parse(text, chrono_tz::UTC).unwrap()
    }

    #[test]
    fn daily_at_fixed_time() {
        let s = set("DTSTART;TZID=UTC:20250722T000000Z\nRRULE:FREQ=DAILY;INTERVAL=1;BYHOUR=13;BYMINUTE=42;WKST=MO");
        assert_eq!(s.dtstart(), utc("2025-07-22T00:00:00Z"));
        assert_eq!(
            s.next_after(utc("2025-07-22T00:00:00Z")),
            Some(utc("2025-07-22T13:42:00Z"))
        );
        assert_eq!(
            s.next_after(utc("2025-07-22T13:42:00Z")),
            Some(utc("2025-07-23T13:42:00Z"))
        );
    }

    #[test]
    fn count_one_fires_once() {
        let s = set("DTSTART:20250722T130000Z\nRRULE:FREQ=DAILY;COUNT=1");
        let first = s.next_after(utc("2025-07-22T00:00:00Z"));
        assert_eq!(first, Some(utc("2025-07-22T13:00:00Z")));
        assert_eq!(s.next_after(first.unwrap()), None);
    }

    #[test]
    fn exdate_wins_over_rule() {
        let s = set(
            "DTSTART:20250722T090000Z\nRRULE:FREQ=DAILY\nEXDATE:20250723T090000Z,20250724T090000Z",
        );
        assert_eq!(
            s.next_after(utc("2025-07-22T09:00:00Z")),
            Some(utc("2025-07-25T09:00:00Z"))
        );
    }

    #[test]
    fn exdate_wins_over_rdate() {
        let s = set("DTSTART:20250722T090000Z\nRDATE:20250801T120000Z\nEXDATE:20250801T120000Z");
        assert_eq!(s.next_after(utc("2025-07-22T00:00:00Z")), None);
    }

    #[test]
    fn exrule_removes_weekends() {
        // 2025-07-26 is a Saturday.
        let s = set(
            "DTSTART:20250725T090000Z\nRRULE:FREQ=DAILY\nEXRULE:FREQ=WEEKLY;BYDAY=SA,SU",
        );
        assert_eq!(
            s.next_after(utc("2025-07-25T09:00:00Z")),
            Some(utc("2025-07-28T09:00:00Z"))
        );
    }

    #[test]
    fn long_exrule_window_is_skipped() {
        let s = set(
            "DTSTART:20250701T000000Z\nRRULE:FREQ=MINUTELY\nEXRULE:FREQ=MINUTELY;BYMONTH=8",
        );
        assert_eq!(
            s.next_after(utc("2025-07-31T23:59:00Z")),
            Some(utc("2025-09-01T00:00:00Z"))
        );
        assert_eq!(
            s.next_after(utc("2025-08-15T12:00:00Z")),
            Some(utc("2025-09-01T00:00:00Z"))
        );
    }

    #[test]
    fn exrule_with_count_only_excludes_its_occurrences() {
        let s = set(
            "DTSTART:20250722T090000Z\nRRULE:FREQ=DAILY\nEXRULE:FREQ=DAILY;COUNT=3",
        );
        assert_eq!(
            s.next_after(utc("2025-07-01T00:00:00Z")),
            Some(utc("2025-07-25T09:00:00Z"))
        );
        assert_eq!(
            s.next_after(utc("2025-07-25T09:00:00Z")),
            Some(utc("2025-07-26T09:00:00Z"))
        );
    }

    #[test]
    fn fully_excluded_set_gives_up_past_horizon() {
        let s = set("DTSTART:20250722T090000Z\nRRULE:FREQ=DAILY\nEXRULE:FREQ=DAILY");
        assert_eq!(s.next_after(utc("2025-07-22T00:00:00Z")), None);
    }

    #[test]
    fn rdates_merge_with_rules() {
        let s = set("DTSTART:20250722T090000Z\nRRULE:FREQ=WEEKLY;COUNT=2\nRDATE:20250724T180000Z");
        let mut cursor = utc("2025-07-22T00:00:00Z");
        let mut got = Vec::new();
        while let Some(next) = s.next_after(cursor) {
            got.push(next);
            cursor = next;
        }
        assert_eq!(
            got,
            [
                utc("2025-07-22T09:00:00Z"),
                utc("2025-07-24T18:00:00Z"),
                utc("2025-07-29T09:00:00Z"),
            ]
        );
    }

    #[test]
    fn tzid_wall_clock_start() {
        let s = set("DTSTART;TZID=America/New_York:20250722T090000\nRRULE:FREQ=DAILY");
        assert_eq!(
            s.next_after(utc("2025-07-22T00:00:00Z")),
            Some(utc("2025-07-22T13:00:00Z"))
        );
    }

    #[test]
    fn date_only_start_runs_at_midnight() {
        let s = set("DTSTART;VALUE=DATE:20250722\nRRULE:FREQ=DAILY");
        assert_eq!(
            s.next_after(utc("2025-07-22T06:00:00Z")),
            Some(utc("2025-07-23T00:00:00Z"))
        );
    }

    #[test]
    fn structural_errors() {
        let parse = |t: &str| RecurrenceSet::parse(t, chrono_tz::UTC).unwrap_err();
        assert_eq!(parse("RRULE:FREQ=DAILY"), RRuleError::MissingDtstart);
        assert_eq!(
            parse("DTSTART:20250722T000000Z\nDTSTART:20250723T000000Z\nRRULE:FREQ=DAILY"),
            RRuleError::DuplicateDtstart
        );
        assert_eq!(parse("DTSTART:20250722T000000Z"), RRuleError::NoRecurrence);
        assert_eq!(
            parse("DTSTART:2025-07-22\nRRULE:FREQ=DAILY"),
            RRuleError::InvalidDate("2025-07-22".into())
        );
        assert_eq!(
            parse("DTSTART:20250722T000000Z\nRRULE:INTERVAL=1"),
            RRuleError::MissingFreq
        );
    }
}
