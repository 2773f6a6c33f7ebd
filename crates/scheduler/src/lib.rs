//! repeatq scheduling loop: owns repeatable jobs, waits for each job's next
//! trigger and hands firings to a handler.

pub mod cli;
pub mod clock;
pub mod event;
pub mod handler;
pub mod job;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::SchedulerEvent;
pub use handler::{Firing, FiringHandler, LogHandler};
pub use job::{JobHandle, JobView};
pub use scheduler::Scheduler;
