//! RFC 5545 recurrence sets: `DTSTART` plus any number of `RRULE`, `RDATE`,
//! `EXRULE` and `EXDATE` lines.
//!
//! Only forward iteration is provided. Rules are expanded one frequency
//! period at a time; nothing is materialised beyond the period that holds
//! the next occurrence.

mod parse;
mod rule;
mod set;

use chrono::Weekday;

pub use parse::PROPERTY_NAMES;
pub use set::RecurrenceSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RRuleError {
    #[error("DTSTART is required")]
    MissingDtstart,

    #[error("DTSTART may appear only once")]
    DuplicateDtstart,

    #[error("at least one RRULE or RDATE is required")]
    NoRecurrence,

    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    #[error("malformed line '{0}': expected NAME[;PARAMS]:VALUE")]
    MalformedLine(String),

    #[error("invalid date-time '{0}'")]
    InvalidDate(String),

    #[error("local time {0} does not exist in its timezone")]
    NonexistentLocalTime(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("invalid {part} value '{value}'")]
    InvalidRulePart { part: String, value: String },

    #[error("unknown rule part '{0}'")]
    UnknownRulePart(String),

    #[error("rule part {0} given more than once")]
    DuplicateRulePart(String),

    #[error("FREQ is required")]
    MissingFreq,

    #[error("COUNT and UNTIL are mutually exclusive")]
    CountWithUntil,

    #[error("{part} is not allowed with FREQ={freq}")]
    NotApplicable { part: &'static str, freq: Frequency },

    #[error("BYSETPOS requires another BYxxx rule part")]
    BareSetPos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
    Minutely,
    Secondly,
}

impl Frequency {
    /// Length of one period in seconds, for the frequencies shorter than a day.
    fn sub_daily_unit(self) -> Option<i64> {
        match self {
            Self::Hourly => Some(3_600),
            Self::Minutely => Some(60),
            Self::Secondly => Some(1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Yearly => "YEARLY",
            Self::Monthly => "MONTHLY",
            Self::Weekly => "WEEKLY",
            Self::Daily => "DAILY",
            Self::Hourly => "HOURLY",
            Self::Minutely => "MINUTELY",
            Self::Secondly => "SECONDLY",
        })
    }
}

/// A `BYDAY` entry such as `MO`, `1FR` or `-1SU`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdayNum {
    pub ordinal: Option<i32>,
    pub weekday: Weekday,
}
