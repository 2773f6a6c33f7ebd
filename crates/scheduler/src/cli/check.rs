use rq_domain::Grammar;
use rq_trigger::TriggerResolver;

use super::unescape_pattern;

/// Classify and parse `pattern`, printing the grammar or the error.
///
/// Returns `true` when the pattern is usable.
pub fn run(pattern: &str) -> bool {
    let pattern = unescape_pattern(pattern);
    match TriggerResolver::new().check_pattern(&pattern) {
        Ok(grammar) => {
            println!("{} pattern OK", label(grammar));
            true
        }
        Err(e) => {
            println!("{e}");
            false
        }
    }
}

fn label(grammar: Grammar) -> &'static str {
    match grammar {
        Grammar::Cron => "cron",
        Grammar::Rrule => "RRULE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_rejects() {
        assert!(run("*/15 9-17 * * MON-FRI"));
        assert!(run("DTSTART:20250722T000000Z\\nRRULE:FREQ=WEEKLY;BYDAY=MO"));
        assert!(!run("not a schedule"));
        assert!(!run("@reboot"));
        assert!(!run("0 25 * * *"));
    }
}
