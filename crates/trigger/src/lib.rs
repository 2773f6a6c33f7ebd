//! Trigger resolution for repeatable jobs: cron and RRULE grammar adapters,
//! pattern classification, the resolver, and the per-job recurrence state
//! machine.

pub mod adapter;
pub mod classify;
pub mod cron;
pub mod machine;
pub mod resolver;
pub mod rrule;

pub use adapter::{CronAdapter, GrammarAdapter, Occurrence, RRuleAdapter};
pub use classify::classify;
pub use machine::{FireOutcome, FiringTicket, RecurrenceMachine};
pub use resolver::TriggerResolver;
