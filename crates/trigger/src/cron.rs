//! Cron grammar: parser and timezone-aware next-occurrence evaluator.
//!
//! Accepts 5 fields (`min hour dom month dow`) or 6 with a leading seconds
//! field, the usual `@yearly`-style macros, and month/weekday names.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

/// How far ahead `next_after` searches before concluding the expression
/// never matches again (e.g. `0 0 30 2 *`).
const SEARCH_HORIZON_YEARS: i32 = 8;

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 or 6 fields, got {0}")]
    FieldCount(usize),

    #[error("{field}: invalid value '{token}'")]
    InvalidValue { field: &'static str, token: String },

    #[error("{field}: value {value} out of range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field}: range start {start} is after end {end}")]
    InvertedRange {
        field: &'static str,
        start: u32,
        end: u32,
    },

    #[error("{field}: invalid step '{token}'")]
    InvalidStep { field: &'static str, token: String },

    #[error("unknown macro '@{0}'")]
    UnknownMacro(String),

    #[error("'@{0}' has no next occurrence in a recurring schedule")]
    Unsupported(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fields
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Three-letter aliases; index 0 maps to `min`.
    names: &'static [&'static str],
}

const SECOND: FieldSpec = FieldSpec { name: "second", min: 0, max: 59, names: &[] };
const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, names: MONTH_NAMES };
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 6, names: WEEKDAY_NAMES };

/// Set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FieldSet(u64);

impl FieldSet {
    fn insert(&mut self, value: u32) {
        self.0 |= 1 << value;
    }

    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }
}

fn parse_value(token: &str, spec: &FieldSpec) -> Result<u32, CronError> {
    let value = if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        token.parse::<u32>().map_err(|_| CronError::InvalidValue {
            field: spec.name,
            token: token.to_string(),
        })?
    } else {
        let idx = spec
            .names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(token))
            .ok_or_else(|| CronError::InvalidValue {
                field: spec.name,
                token: token.to_string(),
            })?;
        spec.min + idx as u32
    };
    if value < spec.min || value > spec.max {
        return Err(CronError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

fn parse_step(token: &str, spec: &FieldSpec) -> Result<u32, CronError> {
    match token.parse::<u32>() {
        Ok(n) if n > 0 && n <= spec.max => Ok(n),
        _ => Err(CronError::InvalidStep {
            field: spec.name,
            token: token.to_string(),
        }),
    }
}

/// Parse one field: `*` (or `?`), `*/n`, `a`, `a-b`, `a-b/n`, `a/n`, or a comma list
/// of those.
fn parse_field(field: &str, spec: &FieldSpec) -> Result<FieldSet, CronError> {
    let mut set = FieldSet::default();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(parse_step(step, spec)?)),
            None => (part, None),
        };
        let (start, end) = if range == "*" || range == "?" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let (start, end) = (parse_value(a, spec)?, parse_value(b, spec)?);
            if start > end {
                return Err(CronError::InvertedRange {
                    field: spec.name,
                    start,
                    end,
                });
            }
            (start, end)
        } else {
            let value = parse_value(range, spec)?;
            // `a/n` runs from `a` to the end of the field.
            if step.is_some() {
                (value, spec.max)
            } else {
                (value, value)
            }
        };
        for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
            set.insert(value);
        }
    }
    Ok(set)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Expression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    /// Day-of-month and day-of-week are OR-ed when both are restricted
    /// (neither starts with `*`), AND-ed otherwise.
    dom_restricted: bool,
    dow_restricted: bool,
}

/// Expand a `@macro` to its 5-field form.
pub fn expand_macro(name: &str) -> Result<&'static str, CronError> {
    match name.to_ascii_lowercase().as_str() {
        "yearly" | "annually" => Ok("0 0 1 1 *"),
        "monthly" => Ok("0 0 1 * *"),
        "weekly" => Ok("0 0 * * 0"),
        "daily" => Ok("0 0 * * *"),
        "hourly" => Ok("0 * * * *"),
        "reboot" => Err(CronError::Unsupported(name.to_string())),
        _ => Err(CronError::UnknownMacro(name.to_string())),
    }
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let expr = expr.trim();
        let expr = match expr.strip_prefix('@') {
            Some(name) => expand_macro(name)?,
            None => expr,
        };

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let (seconds, rest) = match fields.len() {
            5 => ("0", &fields[..]),
            6 => (fields[0], &fields[1..]),
            n => return Err(CronError::FieldCount(n)),
        };

        Ok(Self {
            seconds: parse_field(seconds, &SECOND)?,
            minutes: parse_field(rest[0], &MINUTE)?,
            hours: parse_field(rest[1], &HOUR)?,
            days_of_month: parse_field(rest[2], &DAY_OF_MONTH)?,
            months: parse_field(rest[3], &MONTH)?,
            days_of_week: parse_field(rest[4], &DAY_OF_WEEK)?,
            dom_restricted: is_restricted(rest[2]),
            dow_restricted: is_restricted(rest[4]),
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self.days_of_week.contains(date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// Check if a local wall-clock time matches the expression.
    pub fn matches_local(&self, dt: &NaiveDateTime) -> bool {
        self.months.contains(dt.month())
            && self.day_matches(dt.date())
            && self.hours.contains(dt.hour())
            && self.minutes.contains(dt.minute())
            && self.seconds.contains(dt.second())
    }

    /// Compute the first occurrence strictly after `after`, evaluated in the
    /// given timezone.
    ///
    /// **DST handling:**
    /// - Spring-forward gaps: local times that don't exist are skipped.
    /// - Fall-back overlaps: the earliest (pre-transition) mapping is chosen.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
        let local_after = after.with_timezone(tz).naive_local();
        let mut candidate = local_after.with_nanosecond(0)? + chrono::Duration::seconds(1);
        let last_year = candidate.year() + SEARCH_HORIZON_YEARS;

        while candidate.year() <= last_year {
            if !self.months.contains(candidate.month()) {
                candidate = start_of_next_month(&candidate)?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = candidate.date().and_hms_opt(candidate.hour(), 0, 0)?
                    + chrono::Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(candidate.minute()) {
                candidate = candidate
                    .date()
                    .and_hms_opt(candidate.hour(), candidate.minute(), 0)?
                    + chrono::Duration::minutes(1);
                continue;
            }
            if !self.seconds.contains(candidate.second()) {
                candidate += chrono::Duration::seconds(1);
                continue;
            }

            let resolved = match tz.from_local_datetime(&candidate) {
                chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
                // DST gap: this local time doesn't exist.
                chrono::LocalResult::None => None,
            };
            match resolved {
                Some(next) if next > *after => return Some(next),
                _ => candidate += chrono::Duration::seconds(1),
            }
        }
        None
    }
}

fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field == "?")
}

fn start_of_next_month(dt: &NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if dt.month() == 12 {
        (dt.year() + 1, 1)
    } else {
        (dt.year(), dt.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next(expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        CronExpr::parse(expr).unwrap().next_after(&after, &chrono_tz::UTC)
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn every_5_minutes() {
        let expr = CronExpr::parse("*/5 * * * *").unwrap();
        assert!(expr.matches_local(&at(2024, 6, 15, 10, 0, 0).naive_utc()));
        assert!(!expr.matches_local(&at(2024, 6, 15, 10, 3, 0).naive_utc()));
    }

    #[test]
    fn specific_time_same_day() {
        let after = at(2025, 7, 22, 0, 0, 0);
        assert_eq!(next("0 13 * * *", after), Some(at(2025, 7, 22, 13, 0, 0)));
    }

    #[test]
    fn exact_match_is_not_returned() {
        let after = at(2025, 7, 22, 13, 0, 0);
        assert_eq!(next("0 13 * * *", after), Some(at(2025, 7, 23, 13, 0, 0)));
    }

    #[test]
    fn subsecond_reference_rounds_up() {
        let after = at(2025, 7, 22, 12, 59, 59) + chrono::Duration::milliseconds(500);
        assert_eq!(next("0 13 * * *", after), Some(at(2025, 7, 22, 13, 0, 0)));
    }

    #[test]
    fn range_and_list() {
        let expr = CronExpr::parse("0,15,30,45 9-17 * * *").unwrap();
        assert!(expr.matches_local(&at(2024, 6, 15, 10, 15, 0).naive_utc()));
        assert!(!expr.matches_local(&at(2024, 6, 15, 10, 20, 0).naive_utc()));
        assert!(!expr.matches_local(&at(2024, 6, 15, 20, 0, 0).naive_utc()));
    }

    #[test]
    fn stepped_range_and_open_step() {
        let expr = CronExpr::parse("10-30/10 5/6 * * *").unwrap();
        for (h, m) in [(5, 10), (11, 20), (17, 30), (23, 10)] {
            assert!(expr.matches_local(&at(2024, 1, 1, h, m, 0).naive_utc()));
        }
        assert!(!expr.matches_local(&at(2024, 1, 1, 6, 10, 0).naive_utc()));
        assert!(!expr.matches_local(&at(2024, 1, 1, 5, 40, 0).naive_utc()));
    }

    #[test]
    fn six_field_expression_has_seconds() {
        let after = at(2024, 6, 15, 10, 0, 0);
        assert_eq!(next("*/15 * * * * *", after), Some(at(2024, 6, 15, 10, 0, 15)));
        assert_eq!(next("30 0 9 * * *", after), Some(at(2024, 6, 16, 9, 0, 30)));
    }

    #[test]
    fn month_and_weekday_names() {
        // 2024-06-15 is a Saturday.
        let after = at(2024, 6, 15, 10, 0, 0);
        assert_eq!(next("0 9 * * mon-fri", after), Some(at(2024, 6, 17, 9, 0, 0)));
        assert_eq!(next("0 0 1 JAN *", after), Some(at(2025, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn macros_expand() {
        let after = at(2024, 6, 15, 10, 30, 0);
        assert_eq!(next("@hourly", after), Some(at(2024, 6, 15, 11, 0, 0)));
        assert_eq!(next("@daily", after), Some(at(2024, 6, 16, 0, 0, 0)));
        assert_eq!(next("@weekly", after), Some(at(2024, 6, 16, 0, 0, 0)));
        assert_eq!(next("@monthly", after), Some(at(2024, 7, 1, 0, 0, 0)));
        assert_eq!(next("@yearly", after), Some(at(2025, 1, 1, 0, 0, 0)));
        assert_eq!(next("@ANNUALLY", after), Some(at(2025, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn reboot_is_unsupported() {
        assert_eq!(
            CronExpr::parse("@reboot"),
            Err(CronError::Unsupported("reboot".into()))
        );
        assert!(matches!(
            CronExpr::parse("@fortnightly"),
            Err(CronError::UnknownMacro(_))
        ));
    }

    #[test]
    fn day_of_month_or_day_of_week_when_both_restricted() {
        // The 13th, or any Friday. 2024-06-14 is a Friday.
        let after = at(2024, 6, 10, 0, 0, 0);
        assert_eq!(next("0 0 13 * 5", after), Some(at(2024, 6, 13, 0, 0, 0)));
        let after = at(2024, 6, 13, 0, 0, 0);
        assert_eq!(next("0 0 13 * 5", after), Some(at(2024, 6, 14, 0, 0, 0)));
    }

    #[test]
    fn day_of_week_alone_is_and_ed() {
        // Stepped dom starts with '*', so it does not trigger the OR rule.
        let after = at(2024, 6, 10, 0, 0, 0);
        assert_eq!(next("0 0 */2 * 5", after), Some(at(2024, 6, 21, 0, 0, 0)));
    }

    #[test]
    fn question_mark_is_a_wildcard() {
        let after = at(2024, 6, 10, 0, 0, 0);
        assert_eq!(next("0 0 ? * 5", after), Some(at(2024, 6, 14, 0, 0, 0)));
    }

    #[test]
    fn leap_day_is_found() {
        let after = at(2024, 3, 1, 0, 0, 0);
        assert_eq!(next("0 0 29 2 *", after), Some(at(2028, 2, 29, 0, 0, 0)));
    }

    #[test]
    fn impossible_date_has_no_occurrence() {
        let after = at(2024, 1, 1, 0, 0, 0);
        assert_eq!(next("0 0 30 2 *", after), None);
    }

    #[test]
    fn successive_occurrences_strictly_increase() {
        let expr = CronExpr::parse("*/7 * * * *").unwrap();
        let mut cursor = at(2024, 12, 31, 23, 0, 0);
        for _ in 0..50 {
            let next = expr.next_after(&cursor, &chrono_tz::UTC).unwrap();
            assert!(next > cursor);
            cursor = next;
        }
    }

    // ── Validation ────────────────────────────────────────────────────

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(CronExpr::parse("* * *"), Err(CronError::FieldCount(3)));
        assert_eq!(CronExpr::parse("* * * * * * *"), Err(CronError::FieldCount(7)));
        assert_eq!(CronExpr::parse(""), Err(CronError::FieldCount(0)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        for expr in ["60 * * * *", "* 24 * * *", "* * 0 * *", "* * * 13 *", "* * * * 7"] {
            let err = CronExpr::parse(expr).unwrap_err();
            assert!(matches!(err, CronError::OutOfRange { .. }), "{expr}: {err}");
        }
    }

    #[test]
    fn rejects_bad_tokens() {
        assert!(matches!(
            CronExpr::parse("*/0 * * * *"),
            Err(CronError::InvalidStep { .. })
        ));
        assert!(matches!(
            CronExpr::parse("abc * * * *"),
            Err(CronError::InvalidValue { field: "minute", .. })
        ));
        assert!(matches!(
            CronExpr::parse("1,,2 * * * *"),
            Err(CronError::InvalidValue { .. })
        ));
        assert!(matches!(
            CronExpr::parse("30-10 * * * *"),
            Err(CronError::InvertedRange { start: 30, end: 10, .. })
        ));
    }

    #[test]
    fn error_message_names_the_field() {
        let err = CronExpr::parse("61 * * * *").unwrap_err();
        assert_eq!(err.to_string(), "minute: value 61 out of range 0..=59");
    }

    // ── Timezone-aware evaluation ─────────────────────────────────────

    #[test]
    fn timezone_basic() {
        let after = at(2024, 6, 15, 12, 0, 0);
        let tz: chrono_tz::Tz = "US/Eastern".parse().unwrap();
        let next = CronExpr::parse("0 9 * * *").unwrap().next_after(&after, &tz).unwrap();
        assert_eq!(next, at(2024, 6, 15, 13, 0, 0)); // 9 ET = 13 UTC (EDT is UTC-4)
    }

    #[test]
    fn timezone_spring_forward_skips_gap() {
        let after = at(2024, 3, 10, 6, 0, 0);
        let tz: chrono_tz::Tz = "US/Eastern".parse().unwrap();
        let next = CronExpr::parse("30 2 * * *").unwrap().next_after(&after, &tz).unwrap();
        assert_eq!(next, at(2024, 3, 11, 6, 30, 0));
    }

    #[test]
    fn timezone_fall_back_takes_earliest() {
        let after = at(2024, 11, 3, 4, 0, 0);
        let tz: chrono_tz::Tz = "US/Eastern".parse().unwrap();
        let next = CronExpr::parse("30 1 * * *").unwrap().next_after(&after, &tz).unwrap();
        assert_eq!(next, at(2024, 11, 3, 5, 30, 0));
    }
}
