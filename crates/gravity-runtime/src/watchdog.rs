//! Idle shutdown watchdog for managed mode.
//!
//! Every [`WATCHDOG_INTERVAL`] the watchdog samples the connection set. A
//! tick with no open connections increments the quiet counter; a tick with
//! any open connection resets it to zero. When the counter reaches
//! [`IDLE_TICK_LIMIT`] the watchdog resolves with an [`IdleTimeout`], which
//! the caller turns into process exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::connections::ConnectionSet;
use crate::health::{HealthReporter, WatchdogTick};

/// Time between watchdog samples.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive quiet samples tolerated before shutdown.
pub const IDLE_TICK_LIMIT: u32 = 6;

/// State of the watchdog after a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Still waiting; carries the consecutive quiet tick count.
    Running(u32),
    /// The quiet tick limit was reached.
    Terminated,
}

/// Pure counter behind the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTracker {
    ticks: u32,
    limit: u32,
}

impl IdleTracker {
    /// Creates a tracker that terminates after `limit` quiet ticks.
    #[must_use]
    pub const fn new(limit: u32) -> Self {
        Self { ticks: 0, limit }
    }

    /// Records one sample of the open connection count.
    pub fn observe(&mut self, open_connections: usize) -> WatchdogState {
        if open_connections > 0 {
            self.ticks = 0;
        } else {
            self.ticks = self.ticks.saturating_add(1);
        }
        if self.ticks >= self.limit {
            WatchdogState::Terminated
        } else {
            WatchdogState::Running(self.ticks)
        }
    }

    /// Consecutive quiet ticks counted so far.
    #[must_use]
    pub const fn ticks(&self) -> u32 {
        self.ticks
    }
}

impl Default for IdleTracker {
    fn default() -> Self {
        Self::new(IDLE_TICK_LIMIT)
    }
}

/// Returned when the watchdog decides the server has been idle too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimeout {
    /// Quiet time observed before giving up.
    pub idle_for: Duration,
}

/// Background task sampling the connection set.
pub struct IdleWatchdog {
    connections: Arc<ConnectionSet>,
    reporter: Arc<dyn HealthReporter>,
    interval: Duration,
    limit: u32,
}

impl IdleWatchdog {
    /// Creates a watchdog with the default five-second, six-tick schedule.
    #[must_use]
    pub fn new(connections: Arc<ConnectionSet>, reporter: Arc<dyn HealthReporter>) -> Self {
        Self {
            connections,
            reporter,
            interval: WATCHDOG_INTERVAL,
            limit: IDLE_TICK_LIMIT,
        }
    }

    /// Overrides the sampling schedule.
    #[must_use]
    pub const fn with_schedule(mut self, interval: Duration, limit: u32) -> Self {
        self.interval = interval;
        self.limit = limit;
        self
    }

    /// Samples until the quiet tick limit is reached.
    ///
    /// The first sample is taken one interval after the call.
    pub async fn run(self) -> IdleTimeout {
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tracker = IdleTracker::new(self.limit);
        loop {
            ticker.tick().await;
            let open_connections = self.connections.open_count();
            let state = tracker.observe(open_connections);
            self.reporter.watchdog_tick(WatchdogTick {
                open_connections,
                idle_ticks: tracker.ticks(),
            });
            if state == WatchdogState::Terminated {
                let idle_for = self.interval.saturating_mul(tracker.ticks());
                self.reporter.idle_timeout(idle_for);
                return IdleTimeout { idle_for };
            }
        }
    }
}

impl std::fmt::Debug for IdleWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleWatchdog")
            .field("interval", &self.interval)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
