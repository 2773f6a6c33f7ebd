//! Forward expansion of one recurrence rule bound to its `DTSTART`.
//!
//! Each frequency period (a year, a month, a week starting on `WKST`, a day,
//! or a single hour/minute/second) is expanded to the sorted local times it
//! contains, after which `BYSETPOS` picks from that list. Local times are
//! mapped to instants through the rule's zone at the very end.

use std::collections::VecDeque;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;

use super::parse::{DateValue, RuleParts};
use super::{Frequency, RRuleError};

/// Consecutive periods without a candidate before the rule is treated as
/// exhausted (e.g. `FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=30`).
fn max_empty_periods(freq: Frequency) -> u32 {
    match freq {
        Frequency::Yearly => 400,
        Frequency::Monthly => 4_800,
        Frequency::Weekly => 21_000,
        Frequency::Daily => 146_100,
        _ => 500_000,
    }
}

#[derive(Debug, Clone)]
pub(super) struct Rule {
    parts: RuleParts,
    dtstart: NaiveDateTime,
    zone: Tz,
    until: Option<DateTime<Utc>>,
    until_local: Option<NaiveDateTime>,
}

impl Rule {
    pub fn new(parts: RuleParts, dtstart: NaiveDateTime, zone: Tz) -> Result<Self, RRuleError> {
        let until = match parts.until {
            None => None,
            // A date-only UNTIL includes the whole day.
            Some(DateValue::Date(d)) => {
                let end_of_day = d
                    .and_hms_opt(23, 59, 59)
                    .ok_or_else(|| RRuleError::InvalidDate(d.to_string()))?;
                Some(DateValue::Local(end_of_day).to_instant(zone)?)
            }
            Some(value) => Some(value.to_instant(zone)?),
        };
        Ok(Self {
            until_local: until.map(|u| u.with_timezone(&zone).naive_local()),
            until,
            parts,
            dtstart,
            zone,
        })
    }

    /// Occurrences in ascending order. With `hint`, iteration starts near
    /// the period containing `hint` rather than at `DTSTART`; callers still
    /// filter for the exact bound they need. `COUNT` rules only start late
    /// when the occurrences before that period can be counted without
    /// expanding them.
    pub fn occurrences(&self, hint: Option<DateTime<Utc>>) -> Occurrences<'_> {
        let mut iter = Occurrences {
            rule: self,
            period: self.period_start(self.dtstart),
            pending: VecDeque::new(),
            emitted: 0,
            done: false,
        };
        let Some(hint) = hint else {
            return iter;
        };
        let target = hint.with_timezone(&self.zone).naive_local();
        match self.parts.count {
            None => iter.period = self.aligned_period(target),
            Some(count) => {
                if let Some((period, emitted)) = self.skip_counted(target) {
                    iter.period = Some(period);
                    iter.emitted = emitted;
                    iter.done = emitted >= u64::from(count);
                }
            }
        }
        iter
    }

    fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.zone.from_local_datetime(&local) {
            chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            chrono::LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            chrono::LocalResult::None => None,
        }
    }

    // ── Periods ───────────────────────────────────────────────────────

    /// Truncate a local time to the start of the period containing it.
    fn period_start(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = local.date();
        match self.parts.freq {
            Frequency::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0),
            Frequency::Monthly => {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?.and_hms_opt(0, 0, 0)
            }
            Frequency::Weekly => {
                let back = days_since_week_start(date.weekday(), self.parts.week_start);
                (date - Duration::days(back)).and_hms_opt(0, 0, 0)
            }
            Frequency::Daily => date.and_hms_opt(0, 0, 0),
            Frequency::Hourly => date.and_hms_opt(local.hour(), 0, 0),
            Frequency::Minutely => date.and_hms_opt(local.hour(), local.minute(), 0),
            Frequency::Secondly => local.with_nanosecond(0),
        }
    }

    /// Move `period` forward by `units` frequency units.
    fn advance(&self, period: NaiveDateTime, units: i64) -> Option<NaiveDateTime> {
        match self.parts.freq {
            Frequency::Yearly => {
                let year = period.year().checked_add(i32::try_from(units).ok()?)?;
                NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
            }
            Frequency::Monthly => {
                let total = i64::from(period.year()) * 12 + i64::from(period.month0()) + units;
                let year = i32::try_from(total.div_euclid(12)).ok()?;
                let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
                NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
            }
            Frequency::Weekly => period.checked_add_signed(Duration::days(units * 7)),
            Frequency::Daily => period.checked_add_signed(Duration::days(units)),
            sub_daily => {
                let unit = sub_daily.sub_daily_unit()?;
                period.checked_add_signed(Duration::seconds(units * unit))
            }
        }
    }

    fn next_period(&self, period: NaiveDateTime) -> Option<NaiveDateTime> {
        self.advance(period, i64::from(self.parts.interval))
    }

    /// Frequency units from the `DTSTART` period to the interval-aligned
    /// period at or shortly before the one containing `target`. Starts one
    /// interval early so a repeated local hour cannot hide a candidate.
    fn aligned_units(&self, target: NaiveDateTime) -> Option<i64> {
        let first = self.period_start(self.dtstart)?;
        let target = self.period_start(target)?;
        if target <= first {
            return Some(0);
        }
        let elapsed = match self.parts.freq {
            Frequency::Yearly => i64::from(target.year() - first.year()),
            Frequency::Monthly => {
                i64::from(target.year() - first.year()) * 12 + i64::from(target.month())
                    - i64::from(first.month())
            }
            Frequency::Weekly => (target - first).num_days() / 7,
            Frequency::Daily => (target - first).num_days(),
            sub_daily => (target - first).num_seconds() / sub_daily.sub_daily_unit()?,
        };
        let interval = i64::from(self.parts.interval);
        Some((elapsed - elapsed % interval - interval).max(0))
    }

    fn aligned_period(&self, target: NaiveDateTime) -> Option<NaiveDateTime> {
        self.advance(self.period_start(self.dtstart)?, self.aligned_units(target)?)
    }

    /// The aligned period before `target` and the number of occurrences
    /// emitted ahead of it, for rules whose periods all expand alike.
    fn skip_counted(&self, target: NaiveDateTime) -> Option<(NaiveDateTime, u64)> {
        if !self.uniform_periods() {
            return None;
        }
        let units = self.aligned_units(target)?;
        let periods = u64::try_from(units / i64::from(self.parts.interval)).ok()?;
        if periods == 0 {
            return None;
        }
        let first = self.period_start(self.dtstart)?;
        let expanded = self.expand(first);
        let per_period = expanded.len() as u64;
        let in_first = expanded.iter().filter(|t| **t >= self.dtstart).count() as u64;
        let emitted = per_period
            .saturating_mul(periods - 1)
            .saturating_add(in_first);
        Some((self.advance(first, units)?, emitted))
    }

    /// True when every period yields the same number of local times and the
    /// zone has no offset changes to drop or fold any of them.
    fn uniform_periods(&self) -> bool {
        let p = &self.parts;
        let name = self.zone.name();
        let fixed_offset = name.starts_with("Etc/")
            || matches!(name, "UTC" | "UCT" | "GMT" | "Zulu" | "Universal" | "Greenwich");
        let dates_free = p.by_month.is_empty()
            && p.by_week_no.is_empty()
            && p.by_year_day.is_empty()
            && p.by_month_day.is_empty();
        let periods_alike = match p.freq {
            Frequency::Weekly => p.by_day.iter().all(|wd| wd.ordinal.is_none()),
            Frequency::Daily => p.by_day.is_empty(),
            Frequency::Hourly => p.by_day.is_empty() && p.by_hour.is_empty(),
            Frequency::Minutely => {
                p.by_day.is_empty() && p.by_hour.is_empty() && p.by_minute.is_empty()
            }
            Frequency::Secondly => {
                p.by_day.is_empty()
                    && p.by_hour.is_empty()
                    && p.by_minute.is_empty()
                    && p.by_second.is_empty()
            }
            Frequency::Yearly | Frequency::Monthly => false,
        };
        fixed_offset && dates_free && periods_alike
    }

    /// Frequencies shorter than a day step through every period; jump over
    /// whole days, hours or minutes that a `BYxxx` part rules out.
    fn skip_target(&self, period: NaiveDateTime) -> Option<NaiveDateTime> {
        let p = &self.parts;
        if !self.date_matches(period.date()) {
            return period.date().succ_opt()?.and_hms_opt(0, 0, 0);
        }
        if p.freq > Frequency::Hourly && !p.by_hour.is_empty() && !p.by_hour.contains(&period.hour())
        {
            return Some(period.date().and_hms_opt(period.hour(), 0, 0)? + Duration::hours(1));
        }
        if p.freq == Frequency::Secondly
            && !p.by_minute.is_empty()
            && !p.by_minute.contains(&period.minute())
        {
            return Some(
                period.date().and_hms_opt(period.hour(), period.minute(), 0)? + Duration::minutes(1),
            );
        }
        None
    }

    /// Expand `period` and return its candidates with the period to visit
    /// next.
    fn step(&self, period: NaiveDateTime) -> (Vec<NaiveDateTime>, Option<NaiveDateTime>) {
        if let Some(unit) = self.parts.freq.sub_daily_unit() {
            if let Some(target) = self.skip_target(period) {
                let stride = unit * i64::from(self.parts.interval);
                let gap = (target - period).num_seconds();
                let steps = ((gap + stride - 1) / stride).max(1);
                return (Vec::new(), self.advance(period, steps * i64::from(self.parts.interval)));
            }
        }
        (self.expand(period), self.next_period(period))
    }

    // ── Expansion ─────────────────────────────────────────────────────

    fn expand(&self, period: NaiveDateTime) -> Vec<NaiveDateTime> {
        let times = self.candidate_times(period);
        if times.is_empty() {
            return Vec::new();
        }
        let start = period.date();
        let len = match self.parts.freq {
            Frequency::Yearly => days_in_year(start.year()),
            Frequency::Monthly => days_in_month(start.year(), start.month()),
            Frequency::Weekly => 7,
            _ => 1,
        };
        let mut out: Vec<NaiveDateTime> = start
            .iter_days()
            .take(len as usize)
            .filter(|d| self.date_matches(*d))
            .flat_map(|d| times.iter().map(move |t| d.and_time(*t)))
            .collect();
        out.sort();
        out.dedup();
        if !self.parts.by_set_pos.is_empty() {
            out = select_positions(&out, &self.parts.by_set_pos);
        }
        out
    }

    /// Times of day within `period`. Components at or above the frequency's
    /// own unit are fixed by the period; the rest come from `BYxxx` or
    /// default to the `DTSTART` component.
    fn candidate_times(&self, period: NaiveDateTime) -> Vec<NaiveTime> {
        let p = &self.parts;
        let hours = if p.freq >= Frequency::Hourly {
            fixed(period.hour(), &p.by_hour)
        } else {
            list_or(&p.by_hour, self.dtstart.hour())
        };
        let minutes = if p.freq >= Frequency::Minutely {
            fixed(period.minute(), &p.by_minute)
        } else {
            list_or(&p.by_minute, self.dtstart.minute())
        };
        let seconds = if p.freq == Frequency::Secondly {
            fixed(period.second(), &p.by_second)
        } else {
            list_or(&p.by_second, self.dtstart.second())
        };

        let mut times = Vec::with_capacity(hours.len() * minutes.len() * seconds.len());
        for &h in &hours {
            for &m in &minutes {
                for &s in &seconds {
                    if let Some(t) = NaiveTime::from_hms_opt(h, m, s) {
                        times.push(t);
                    }
                }
            }
        }
        times
    }

    fn date_matches(&self, d: NaiveDate) -> bool {
        let p = &self.parts;
        if !p.by_month.is_empty() && !p.by_month.contains(&d.month()) {
            return false;
        }
        if !p.by_week_no.is_empty() && !self.week_no_matches(d) {
            return false;
        }
        if !p.by_year_day.is_empty() && !year_day_matches(d, &p.by_year_day) {
            return false;
        }
        if !p.by_month_day.is_empty() && !month_day_matches(d, &p.by_month_day) {
            return false;
        }
        if !p.by_day.is_empty() && !self.weekday_matches(d) {
            return false;
        }

        let has_day_rule = !(p.by_week_no.is_empty()
            && p.by_year_day.is_empty()
            && p.by_month_day.is_empty()
            && p.by_day.is_empty());
        if has_day_rule {
            return true;
        }
        // Without a day-level part the day comes from DTSTART.
        let start = self.dtstart.date();
        match p.freq {
            Frequency::Yearly if p.by_month.is_empty() => {
                d.month() == start.month() && d.day() == start.day()
            }
            Frequency::Yearly | Frequency::Monthly => d.day() == start.day(),
            Frequency::Weekly => d.weekday() == start.weekday(),
            _ => true,
        }
    }

    /// Numbered weekdays count within the year for YEARLY rules without
    /// `BYMONTH`, within the month otherwise.
    fn weekday_matches(&self, d: NaiveDate) -> bool {
        let in_year = self.parts.freq == Frequency::Yearly && self.parts.by_month.is_empty();
        self.parts.by_day.iter().any(|wd| {
            if d.weekday() != wd.weekday {
                return false;
            }
            let Some(n) = wd.ordinal else {
                return true;
            };
            let (scope_len, index) = if in_year {
                (days_in_year(d.year()), d.ordinal0())
            } else {
                (days_in_month(d.year(), d.month()), d.day0())
            };
            let from_start = (index / 7) as i32 + 1;
            let from_end = -(((scope_len - 1 - index) / 7) as i32 + 1);
            n == from_start || n == from_end
        })
    }

    fn week_no_matches(&self, d: NaiveDate) -> bool {
        let Some((week, weeks_in_year)) = week_number(d, self.parts.week_start) else {
            return false;
        };
        self.parts.by_week_no.iter().any(|&n| {
            if n > 0 {
                n == week
            } else {
                weeks_in_year + n + 1 == week
            }
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Iteration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(super) struct Occurrences<'r> {
    rule: &'r Rule,
    period: Option<NaiveDateTime>,
    pending: VecDeque<NaiveDateTime>,
    emitted: u64,
    done: bool,
}

impl Occurrences<'_> {
    /// Expand periods until one yields candidates. Returns false when the
    /// rule has nothing left to offer.
    fn refill(&mut self) -> bool {
        let rule = self.rule;
        let mut empty = 0;
        while let Some(period) = self.period {
            if rule.until_local.is_some_and(|until| period > until) {
                return false;
            }
            if empty >= max_empty_periods(rule.parts.freq) {
                return false;
            }
            let (candidates, next) = rule.step(period);
            self.period = next;
            if candidates.is_empty() {
                empty += 1;
            } else {
                self.pending.extend(candidates);
                return true;
            }
        }
        false
    }
}

impl Iterator for Occurrences<'_> {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let Some(local) = self.pending.pop_front() else {
                if !self.refill() {
                    self.done = true;
                }
                continue;
            };
            if local < self.rule.dtstart {
                continue;
            }
            // Local times inside a DST gap do not exist and are not counted.
            let Some(instant) = self.rule.to_utc(local) else {
                continue;
            };
            if self.rule.until.is_some_and(|until| instant > until) {
                self.done = true;
                return None;
            }
            self.emitted += 1;
            if self
                .rule
                .parts
                .count
                .is_some_and(|count| self.emitted >= u64::from(count))
            {
                self.done = true;
            }
            return Some(instant);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Calendar helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn fixed(value: u32, by: &[u32]) -> Vec<u32> {
    if by.is_empty() || by.contains(&value) {
        vec![value]
    } else {
        Vec::new()
    }
}

fn list_or(by: &[u32], default: u32) -> Vec<u32> {
    if by.is_empty() {
        vec![default]
    } else {
        by.to_vec()
    }
}

fn select_positions(sorted: &[NaiveDateTime], positions: &[i32]) -> Vec<NaiveDateTime> {
    let len = sorted.len() as i32;
    let mut picked: Vec<NaiveDateTime> = positions
        .iter()
        .filter_map(|&pos| {
            let idx = if pos > 0 { pos - 1 } else { len + pos };
            (0..len).contains(&idx).then(|| sorted[idx as usize])
        })
        .collect();
    picked.sort();
    picked.dedup();
    picked
}

fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

fn month_day_matches(d: NaiveDate, by_month_day: &[i32]) -> bool {
    let len = days_in_month(d.year(), d.month()) as i32;
    let day = d.day() as i32;
    by_month_day
        .iter()
        .any(|&md| if md > 0 { md == day } else { len + md + 1 == day })
}

fn year_day_matches(d: NaiveDate, by_year_day: &[i32]) -> bool {
    let len = days_in_year(d.year()) as i32;
    let day = d.ordinal() as i32;
    by_year_day
        .iter()
        .any(|&yd| if yd > 0 { yd == day } else { len + yd + 1 == day })
}

fn days_since_week_start(day: Weekday, week_start: Weekday) -> i64 {
    i64::from((day.num_days_from_monday() + 7 - week_start.num_days_from_monday()) % 7)
}

/// First day of week 1: the first week with at least four days in `year`.
fn week_one_start(year: i32, week_start: Weekday) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let offset = days_since_week_start(jan1.weekday(), week_start);
    let start = jan1 - Duration::days(offset);
    Some(if 7 - offset >= 4 {
        start
    } else {
        start + Duration::days(7)
    })
}

/// Week number of `d` within its week-numbering year, with the number of
/// weeks in that year.
fn week_number(d: NaiveDate, week_start: Weekday) -> Option<(i32, i32)> {
    let mut year = d.year();
    let mut start = week_one_start(year, week_start)?;
    if d < start {
        year -= 1;
        start = week_one_start(year, week_start)?;
    }
    let mut next = week_one_start(year + 1, week_start)?;
    if d >= next {
        start = next;
        next = week_one_start(year + 2, week_start)?;
    }
    let week = (d - start).num_days() / 7 + 1;
    let weeks = (next - start).num_days() / 7;
    Some((week as i32, weeks as i32))
}
