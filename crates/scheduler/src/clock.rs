//! Time source for the scheduling loop.
//!
//! Job loops never read the system clock directly: they ask the injected
//! [`Clock`] for the current instant and for a wait until a trigger. Tests
//! drive the loop deterministically with [`ManualClock`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Resolve once `now() >= deadline`. Returns at once for past deadlines.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SystemClock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Longest single timer. Waits are re-checked against wall time at least
/// this often so clock adjustments are picked up.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Wall-clock time backed by tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        loop {
            let remaining = match (deadline - Utc::now()).to_std() {
                Ok(d) if !d.is_zero() => d,
                // Negative or zero: the deadline has passed.
                _ => return,
            };
            tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ManualClock
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    tick: Notify,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            tick: Notify::new(),
        }
    }

    /// Jump to `instant` and wake every sleeper.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
        self.tick.notify_waiters();
    }

    pub fn advance(&self, by: chrono::Duration) {
        {
            let mut now = self.now.lock();
            *now += by;
        }
        self.tick.notify_waiters();
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        loop {
            // Register before checking so a concurrent `set` is not missed.
            let notified = self.tick.notified();
            if *self.now.lock() >= deadline {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 22, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn past_deadline_returns_immediately() {
        let clock = ManualClock::new(t0());
        clock.sleep_until(t0()).await;
        clock.sleep_until(t0() - chrono::Duration::hours(1)).await;
        SystemClock.sleep_until(Utc::now() - chrono::Duration::seconds(5)).await;
    }

    #[tokio::test]
    async fn manual_clock_wakes_on_advance() {
        let clock = Arc::new(ManualClock::new(t0()));
        let deadline = t0() + chrono::Duration::hours(13);

        let sleeper = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.sleep_until(deadline).await })
        };

        clock.advance(chrono::Duration::hours(1));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());

        clock.set(deadline);
        tokio::time::timeout(Duration::from_secs(5), sleeper)
            .await
            .expect("sleeper should wake")
            .unwrap();
        assert_eq!(clock.now(), deadline);
    }

    #[tokio::test]
    async fn system_clock_short_sleep() {
        let deadline = Utc::now() + chrono::Duration::milliseconds(20);
        SystemClock.sleep_until(deadline).await;
        assert!(Utc::now() >= deadline);
    }
}
