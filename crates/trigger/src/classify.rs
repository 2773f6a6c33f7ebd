//! Pattern classification. Decides which grammar a pattern belongs to from
//! its shape alone; parsing happens afterwards in the matching adapter.

use rq_domain::{Grammar, TriggerError};

use crate::rrule::PROPERTY_NAMES;

/// Macro names recognised after `@`, including ones the cron adapter then
/// rejects as unsupported.
const CRON_MACROS: &[&str] = &[
    "yearly", "annually", "monthly", "weekly", "daily", "hourly", "reboot",
];

/// Classify `pattern` as cron or RRULE. The two shapes are disjoint: cron
/// fields never contain `:` or `;`, and every RRULE line does.
pub fn classify(pattern: &str) -> Result<Grammar, TriggerError> {
    if looks_like_cron(pattern) {
        Ok(Grammar::Cron)
    } else if looks_like_rrule(pattern) {
        Ok(Grammar::Rrule)
    } else {
        Err(TriggerError::UnrecognizedPattern {
            pattern: pattern.to_string(),
        })
    }
}

fn looks_like_cron(pattern: &str) -> bool {
    let trimmed = pattern.trim();
    if trimmed.contains('\n') {
        return false;
    }
    if let Some(name) = trimmed.strip_prefix('@') {
        return CRON_MACROS.iter().any(|m| m.eq_ignore_ascii_case(name));
    }
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    (5..=6).contains(&fields.len()) && fields.iter().all(|f| is_cron_field(f))
}

/// A field made of atoms joined by `,`, `-` or `/`.
fn is_cron_field(field: &str) -> bool {
    field.split([',', '-', '/']).all(is_cron_atom)
}

/// `*`, `?`, a number, or a three-letter month/weekday name.
fn is_cron_atom(atom: &str) -> bool {
    atom == "*"
        || atom == "?"
        || (!atom.is_empty() && atom.bytes().all(|b| b.is_ascii_digit()))
        || (atom.len() == 3 && atom.bytes().all(|b| b.is_ascii_alphabetic()))
}

fn looks_like_rrule(pattern: &str) -> bool {
    let mut lines = pattern
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .peekable();
    lines.peek().is_some() && lines.all(is_rrule_line)
}

fn is_rrule_line(line: &str) -> bool {
    PROPERTY_NAMES.iter().any(|name| {
        line.get(..name.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(name))
            && matches!(line.as_bytes().get(name.len()), Some(b':' | b';'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_shapes() {
        for p in [
            "0 13 * * *",
            "*/5 * * * *",
            "0 9 * * MON-FRI",
            "0 0 1 jan *",
            "30 0 9 * * *",
            "0 0 ? * 5",
            "  @daily ",
            "@Yearly",
            "@reboot",
        ] {
            assert_eq!(classify(p), Ok(Grammar::Cron), "{p}");
        }
    }

    #[test]
    fn rrule_shapes() {
        for p in [
            "DTSTART;TZID=UTC:20250722T000000Z\nRRULE:FREQ=DAILY;INTERVAL=1;BYHOUR=13;BYMINUTE=42;WKST=MO",
            "DTSTART:20250722T000000Z\r\nRRULE:FREQ=DAILY\r\n",
            "RRULE:FREQ=DAILY",
            "dtstart:20250722\nrdate:20250801",
            "DTSTART:20250722T090000Z\nRRULE:FREQ=DAILY\nEXDATE:20250723T090000Z",
        ] {
            assert_eq!(classify(p), Ok(Grammar::Rrule), "{p}");
        }
    }

    #[test]
    fn unrecognized() {
        for p in [
            "not a schedule",
            "",
            "   ",
            "* * *",
            "* * * * * * *",
            "@fortnightly",
            "@midnight",
            "every day at noon",
            "SUMMARY:standup",
            "DTSTART:20250722T000000Z\nSUMMARY:standup",
            "0 13 * * *\n0 14 * * *",
            "RRULES:FREQ=DAILY",
        ] {
            assert!(
                matches!(classify(p), Err(TriggerError::UnrecognizedPattern { .. })),
                "{p:?}"
            );
        }
    }

    #[test]
    fn classification_does_not_validate() {
        // Cron-shaped but out of range: still cron, the adapter rejects it.
        assert_eq!(classify("61 99 * * *"), Ok(Grammar::Cron));
        // RRULE-shaped but missing DTSTART: still rrule.
        assert_eq!(classify("RRULE:FREQ=SOMETIMES"), Ok(Grammar::Rrule));
    }
}
