//! Content-line and rule-part parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use super::{Frequency, RRuleError, WeekdayNum};

/// Property names that may appear in a recurrence set.
pub const PROPERTY_NAMES: &[&str] = &["DTSTART", "RRULE", "EXRULE", "RDATE", "EXDATE"];

/// One `NAME;PARAM=VALUE:VALUE` line.
#[derive(Debug)]
pub(super) struct Property<'a> {
    pub name: String,
    params: Vec<(String, &'a str)>,
    pub value: &'a str,
}

impl Property<'_> {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    /// The zone named by a `TZID` parameter, if any.
    pub fn tzid(&self) -> Result<Option<Tz>, RRuleError> {
        self.param("TZID")
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| RRuleError::UnknownTimezone(name.to_string()))
            })
            .transpose()
    }
}

pub(super) fn parse_property(line: &str) -> Result<Property<'_>, RRuleError> {
    let (head, value) = line
        .split_once(':')
        .ok_or_else(|| RRuleError::MalformedLine(line.to_string()))?;
    let mut parts = head.split(';');
    let name = parts.next().unwrap_or_default().trim().to_ascii_uppercase();
    if !PROPERTY_NAMES.contains(&name.as_str()) {
        return Err(RRuleError::UnknownProperty(name));
    }
    let params = parts
        .map(|p| {
            p.split_once('=')
                .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim()))
                .ok_or_else(|| RRuleError::MalformedLine(line.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Property {
        name,
        params,
        value: value.trim(),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Date values
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A DATE or DATE-TIME value as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DateValue {
    /// `YYYYMMDD`
    Date(NaiveDate),
    /// `YYYYMMDDTHHMMSS`, wall-clock in the property's zone.
    Local(NaiveDateTime),
    /// `YYYYMMDDTHHMMSSZ`
    Utc(DateTime<Utc>),
}

pub(super) fn parse_date_value(value: &str) -> Result<DateValue, RRuleError> {
    let invalid = || RRuleError::InvalidDate(value.to_string());
    match value.len() {
        8 => NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(DateValue::Date)
            .map_err(|_| invalid()),
        15 => NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
            .map(DateValue::Local)
            .map_err(|_| invalid()),
        16 => {
            let core = value
                .strip_suffix('Z')
                .or_else(|| value.strip_suffix('z'))
                .ok_or_else(invalid)?;
            NaiveDateTime::parse_from_str(core, "%Y%m%dT%H%M%S")
                .map(|n| DateValue::Utc(n.and_utc()))
                .map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

/// Map a wall-clock time in `zone` to an instant. Ambiguous times take the
/// earliest mapping; times inside a DST gap are rejected.
pub(super) fn local_to_utc(zone: Tz, local: NaiveDateTime) -> Result<DateTime<Utc>, RRuleError> {
    zone.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| RRuleError::NonexistentLocalTime(local.to_string()))
}

impl DateValue {
    /// Wall-clock time in `zone`. Dates start at midnight.
    pub fn to_local(self, zone: Tz) -> Option<NaiveDateTime> {
        match self {
            Self::Date(d) => d.and_hms_opt(0, 0, 0),
            Self::Local(n) => Some(n),
            Self::Utc(dt) => Some(dt.with_timezone(&zone).naive_local()),
        }
    }

    pub fn to_instant(self, zone: Tz) -> Result<DateTime<Utc>, RRuleError> {
        match self {
            Self::Utc(dt) => Ok(dt),
            other => {
                let local = other
                    .to_local(zone)
                    .ok_or_else(|| RRuleError::InvalidDate(format!("{other:?}")))?;
                local_to_utc(zone, local)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rule parts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The parts of an `RRULE`/`EXRULE` value, validated against each other but
/// not yet bound to a `DTSTART`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct RuleParts {
    pub freq: Frequency,
    pub interval: u32,
    pub count: Option<u32>,
    pub until: Option<DateValue>,
    pub by_second: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_hour: Vec<u32>,
    pub by_day: Vec<WeekdayNum>,
    pub by_month_day: Vec<i32>,
    pub by_year_day: Vec<i32>,
    pub by_week_no: Vec<i32>,
    pub by_month: Vec<u32>,
    pub by_set_pos: Vec<i32>,
    pub week_start: Weekday,
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s.to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_frequency(s: &str) -> Option<Frequency> {
    match s.to_ascii_uppercase().as_str() {
        "YEARLY" => Some(Frequency::Yearly),
        "MONTHLY" => Some(Frequency::Monthly),
        "WEEKLY" => Some(Frequency::Weekly),
        "DAILY" => Some(Frequency::Daily),
        "HOURLY" => Some(Frequency::Hourly),
        "MINUTELY" => Some(Frequency::Minutely),
        "SECONDLY" => Some(Frequency::Secondly),
        _ => None,
    }
}

fn parse_weekday_num(s: &str) -> Option<WeekdayNum> {
    let split = s.len().checked_sub(2)?;
    let weekday = parse_weekday(s.get(split..)?)?;
    let ordinal = match s.get(..split)? {
        "" => None,
        n => {
            let n: i32 = n.strip_prefix('+').unwrap_or(n).parse().ok()?;
            if n == 0 || n.abs() > 53 {
                return None;
            }
            Some(n)
        }
    };
    Some(WeekdayNum { ordinal, weekday })
}

/// Parse a comma list of unsigned values within `range`.
fn unsigned_list(
    part: &str,
    value: &str,
    range: std::ops::RangeInclusive<u32>,
) -> Result<Vec<u32>, RRuleError> {
    value
        .split(',')
        .map(|v| match v.trim().parse::<u32>() {
            Ok(n) if range.contains(&n) => Ok(n),
            _ => Err(invalid_part(part, value)),
        })
        .collect()
}

/// Parse a comma list of non-zero signed values with `|n| <= max`.
fn signed_list(part: &str, value: &str, max: i32) -> Result<Vec<i32>, RRuleError> {
    value
        .split(',')
        .map(|v| {
            let v = v.trim();
            match v.strip_prefix('+').unwrap_or(v).parse::<i32>() {
                Ok(n) if n != 0 && n.abs() <= max => Ok(n),
                _ => Err(invalid_part(part, value)),
            }
        })
        .collect()
}

fn invalid_part(part: &str, value: &str) -> RRuleError {
    RRuleError::InvalidRulePart {
        part: part.to_string(),
        value: value.to_string(),
    }
}

fn positive(part: &str, value: &str) -> Result<u32, RRuleError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid_part(part, value)),
    }
}

pub(super) fn parse_rule(value: &str) -> Result<RuleParts, RRuleError> {
    let mut seen: Vec<String> = Vec::new();
    let mut freq = None;
    let mut rule = RuleParts {
        freq: Frequency::Daily,
        interval: 1,
        count: None,
        until: None,
        by_second: Vec::new(),
        by_minute: Vec::new(),
        by_hour: Vec::new(),
        by_day: Vec::new(),
        by_month_day: Vec::new(),
        by_year_day: Vec::new(),
        by_week_no: Vec::new(),
        by_month: Vec::new(),
        by_set_pos: Vec::new(),
        week_start: Weekday::Mon,
    };

    for part in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, val) = part
            .split_once('=')
            .ok_or_else(|| invalid_part(part, ""))?;
        let key = key.trim().to_ascii_uppercase();
        let val = val.trim();
        if seen.contains(&key) {
            return Err(RRuleError::DuplicateRulePart(key));
        }

        match key.as_str() {
            "FREQ" => freq = Some(parse_frequency(val).ok_or_else(|| invalid_part(&key, val))?),
            "INTERVAL" => rule.interval = positive(&key, val)?,
            "COUNT" => rule.count = Some(positive(&key, val)?),
            "UNTIL" => rule.until = Some(parse_date_value(val)?),
            "BYSECOND" => rule.by_second = unsigned_list(&key, val, 0..=59)?,
            "BYMINUTE" => rule.by_minute = unsigned_list(&key, val, 0..=59)?,
            "BYHOUR" => rule.by_hour = unsigned_list(&key, val, 0..=23)?,
            "BYDAY" => {
                rule.by_day = val
                    .split(',')
                    .map(|d| parse_weekday_num(d.trim()).ok_or_else(|| invalid_part(&key, val)))
                    .collect::<Result<_, _>>()?
            }
            "BYMONTHDAY" => rule.by_month_day = signed_list(&key, val, 31)?,
            "BYYEARDAY" => rule.by_year_day = signed_list(&key, val, 366)?,
            "BYWEEKNO" => rule.by_week_no = signed_list(&key, val, 53)?,
            "BYMONTH" => rule.by_month = unsigned_list(&key, val, 1..=12)?,
            "BYSETPOS" => rule.by_set_pos = signed_list(&key, val, 366)?,
            "WKST" => rule.week_start = parse_weekday(val).ok_or_else(|| invalid_part(&key, val))?,
            _ => return Err(RRuleError::UnknownRulePart(key)),
        }
        seen.push(key);
    }

    rule.freq = freq.ok_or(RRuleError::MissingFreq)?;
    check_combinations(&rule)?;
    Ok(rule)
}

/// Reject the rule-part combinations RFC 5545 marks as not applicable.
fn check_combinations(rule: &RuleParts) -> Result<(), RRuleError> {
    use Frequency::*;

    if rule.count.is_some() && rule.until.is_some() {
        return Err(RRuleError::CountWithUntil);
    }
    let not_applicable = |part| RRuleError::NotApplicable {
        part,
        freq: rule.freq,
    };
    if !rule.by_week_no.is_empty() && rule.freq != Yearly {
        return Err(not_applicable("BYWEEKNO"));
    }
    if !rule.by_year_day.is_empty() && matches!(rule.freq, Daily | Weekly | Monthly) {
        return Err(not_applicable("BYYEARDAY"));
    }
    if !rule.by_month_day.is_empty() && rule.freq == Weekly {
        return Err(not_applicable("BYMONTHDAY"));
    }
    if rule.by_day.iter().any(|d| d.ordinal.is_some()) && !matches!(rule.freq, Monthly | Yearly) {
        return Err(not_applicable("numbered BYDAY"));
    }
    if rule.by_day.iter().any(|d| d.ordinal.is_some())
        && rule.freq == Yearly
        && !rule.by_week_no.is_empty()
    {
        return Err(not_applicable("numbered BYDAY with BYWEEKNO"));
    }
    let has_other_by = !(rule.by_second.is_empty()
        && rule.by_minute.is_empty()
        && rule.by_hour.is_empty()
        && rule.by_day.is_empty()
        && rule.by_month_day.is_empty()
        && rule.by_year_day.is_empty()
        && rule.by_week_no.is_empty()
        && rule.by_month.is_empty());
    if !rule.by_set_pos.is_empty() && !has_other_by {
        return Err(RRuleError::BareSetPos);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_with_params() {
        let prop = parse_property("DTSTART;TZID=Europe/Paris:20250722T090000").unwrap();
        assert_eq!(prop.name, "DTSTART");
        assert_eq!(prop.param("TZID"), Some("Europe/Paris"));
        assert_eq!(prop.tzid().unwrap(), Some(chrono_tz::Europe::Paris));
        assert_eq!(prop.value, "20250722T090000");
    }

    #[test]
    fn property_name_is_case_insensitive() {
        let prop = parse_property("rrule:FREQ=DAILY").unwrap();
        assert_eq!(prop.name, "RRULE");
    }

    #[test]
    fn unknown_property_and_missing_colon() {
        assert_eq!(
            parse_property("SUMMARY:standup").unwrap_err(),
            RRuleError::UnknownProperty("SUMMARY".into())
        );
        assert!(matches!(
            parse_property("RRULE FREQ=DAILY").unwrap_err(),
            RRuleError::MalformedLine(_)
        ));
    }

    #[test]
    fn unknown_tzid() {
        let prop = parse_property("DTSTART;TZID=Mars/Olympus:20250722T090000").unwrap();
        assert_eq!(
            prop.tzid().unwrap_err(),
            RRuleError::UnknownTimezone("Mars/Olympus".into())
        );
    }

    #[test]
    fn date_value_forms() {
        assert!(matches!(parse_date_value("20250722").unwrap(), DateValue::Date(_)));
        assert!(matches!(
            parse_date_value("20250722T134200").unwrap(),
            DateValue::Local(_)
        ));
        let DateValue::Utc(dt) = parse_date_value("20250722T134200Z").unwrap() else {
            panic!("expected a UTC value");
        };
        assert_eq!(dt.to_rfc3339(), "2025-07-22T13:42:00+00:00");
        assert!(parse_date_value("2025-07-22").is_err());
        assert!(parse_date_value("20251322T000000").is_err());
    }

    #[test]
    fn utc_value_is_converted_into_zone() {
        let value = parse_date_value("20250722T120000Z").unwrap();
        let local = value.to_local(chrono_tz::Europe::Paris).unwrap();
        assert_eq!(local.to_string(), "2025-07-22 14:00:00");
    }

    #[test]
    fn full_rule() {
        let rule =
            parse_rule("FREQ=MONTHLY;INTERVAL=2;COUNT=10;BYDAY=1MO,-1FR,+2TU;BYHOUR=9,17;WKST=SU")
                .unwrap();
        assert_eq!(rule.freq, Frequency::Monthly);
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.count, Some(10));
        assert_eq!(
            rule.by_day,
            vec![
                WeekdayNum { ordinal: Some(1), weekday: Weekday::Mon },
                WeekdayNum { ordinal: Some(-1), weekday: Weekday::Fri },
                WeekdayNum { ordinal: Some(2), weekday: Weekday::Tue },
            ]
        );
        assert_eq!(rule.by_hour, vec![9, 17]);
        assert_eq!(rule.week_start, Weekday::Sun);
    }

    #[test]
    fn freq_is_required() {
        assert_eq!(parse_rule("INTERVAL=2").unwrap_err(), RRuleError::MissingFreq);
        assert!(matches!(
            parse_rule("FREQ=FORTNIGHTLY").unwrap_err(),
            RRuleError::InvalidRulePart { .. }
        ));
    }

    #[test]
    fn rejects_bad_values() {
        for rule in [
            "FREQ=DAILY;INTERVAL=0",
            "FREQ=DAILY;COUNT=0",
            "FREQ=DAILY;BYHOUR=24",
            "FREQ=DAILY;BYMINUTE=60",
            "FREQ=MONTHLY;BYMONTHDAY=0",
            "FREQ=MONTHLY;BYMONTHDAY=32",
            "FREQ=YEARLY;BYMONTH=13",
            "FREQ=MONTHLY;BYDAY=0MO",
            "FREQ=MONTHLY;BYDAY=XX",
        ] {
            assert!(parse_rule(rule).is_err(), "{rule} should be rejected");
        }
    }

    #[test]
    fn rejects_duplicate_and_unknown_parts() {
        assert_eq!(
            parse_rule("FREQ=DAILY;FREQ=WEEKLY").unwrap_err(),
            RRuleError::DuplicateRulePart("FREQ".into())
        );
        assert_eq!(
            parse_rule("FREQ=DAILY;BYEASTER=0").unwrap_err(),
            RRuleError::UnknownRulePart("BYEASTER".into())
        );
    }

    #[test]
    fn rejects_not_applicable_combinations() {
        assert_eq!(
            parse_rule("FREQ=DAILY;COUNT=3;UNTIL=20250101").unwrap_err(),
            RRuleError::CountWithUntil
        );
        for rule in [
            "FREQ=MONTHLY;BYWEEKNO=20",
            "FREQ=DAILY;BYYEARDAY=100",
            "FREQ=WEEKLY;BYMONTHDAY=1",
            "FREQ=WEEKLY;BYDAY=1MO",
            "FREQ=DAILY;BYDAY=-1FR",
        ] {
            assert!(
                matches!(parse_rule(rule).unwrap_err(), RRuleError::NotApplicable { .. }),
                "{rule}"
            );
        }
        assert_eq!(
            parse_rule("FREQ=MONTHLY;BYSETPOS=1").unwrap_err(),
            RRuleError::BareSetPos
        );
    }
}
