use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use rq_domain::{RepeatSpec, ScheduleStatus, TriggerError};
use rq_trigger::{FireOutcome, FiringTicket, RecurrenceMachine, TriggerResolver};

use super::{unescape_pattern, NextArgs};

/// Triggers a spec would produce, and where the recurrence stands after them.
#[derive(Debug, Serialize)]
pub struct Preview {
    pub triggers: Vec<FiringTicket>,
    pub status: ScheduleStatus,
}

/// Walk the recurrence state machine from `from`, firing and acknowledging
/// each trigger the instant it comes due, until `count` triggers have been
/// collected or the recurrence ends.
pub fn preview(
    spec: RepeatSpec,
    from: DateTime<Utc>,
    count: usize,
) -> Result<Preview, TriggerError> {
    TriggerResolver::new().validate(&spec)?;
    let mut machine = RecurrenceMachine::new(spec, from);
    machine.advance()?;

    let mut triggers = Vec::with_capacity(count);
    while triggers.len() < count {
        let Some(due) = machine.due_at() else {
            break;
        };
        triggers.push(machine.fire(due)?);
        machine.acknowledge(FireOutcome::Succeeded, due)?;
    }

    Ok(Preview {
        triggers,
        status: machine.status(),
    })
}

pub fn run(args: NextArgs) -> anyhow::Result<()> {
    let spec = RepeatSpec {
        pattern: Some(unescape_pattern(&args.pattern)),
        immediate: args.immediate,
        start_date: args.start_date,
        end_date: args.end_date,
        limit: args.limit,
        ..RepeatSpec::default()
    };
    let from = args.from.unwrap_or_else(Utc::now);
    let preview = preview(spec, from, args.count).context("resolving pattern")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    for ticket in &preview.triggers {
        let marker = if ticket.immediate { "  (immediate)" } else { "" };
        println!(
            "{:>4}  {}{marker}",
            ticket.sequence,
            ticket.scheduled_for.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        );
    }
    if preview.status.is_terminal() {
        println!("-- {}", preview.status);
    }
    Ok(())
}
