//! Pausable periodic tick source.
//!
//! Stopping drops the underlying interval instead of letting it tick into a
//! no-op, so resuming always waits one full period before the next tick.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Default tick period: one second per sequencer tick.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct SessionClock {
    period: Duration,
    interval: Option<Interval>,
}

impl SessionClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Start ticking. The first tick lands one full period from now.
    /// No-op when already running.
    pub fn start(&mut self) {
        if self.interval.is_some() {
            return;
        }
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    /// Run or stop the clock to match `running`.
    pub fn set_running(&mut self, running: bool) {
        if running {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Wait for the next tick. Never completes while stopped, which makes it
    /// safe to use as a `select!` branch.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_a_full_period() {
        let mut clock = SessionClock::default();
        clock.start();
        let before = Instant::now();
        clock.tick().await;
        assert_eq!(Instant::now() - before, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_clock_never_ticks() {
        let mut clock = SessionClock::default();
        clock.start();
        clock.stop();
        assert!(!clock.is_running());
        let result = tokio::time::timeout(Duration::from_secs(5), clock.tick()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_does_not_catch_up() {
        let mut clock = SessionClock::new(Duration::from_secs(1));
        clock.start();
        clock.tick().await;
        clock.stop();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        clock.set_running(true);
        let before = Instant::now();
        clock.tick().await;
        assert_eq!(Instant::now() - before, Duration::from_secs(1));
    }
}
