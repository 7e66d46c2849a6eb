//! Liveness tracking with PING/PONG.
//!
//! On every tick with no PING outstanding, a PING carrying a nonce is sent.
//! A PING unanswered for `fraction` ticks counts as failed; `failure_limit`
//! consecutive failures mean the connection is dead.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// What the caller should do after a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LivenessAction {
    /// Nothing to do.
    Wait,
    /// Send `PING :nonce`.
    SendPing(String),
    /// A PING went unanswered; a new one should be sent.
    Failed {
        /// Consecutive failures so far.
        failures: u32,
        /// Nonce of the replacement PING.
        nonce: String,
    },
    /// Too many failures.
    Disconnect {
        /// Consecutive failures.
        failures: u32,
    },
}

#[derive(Clone, Debug)]
struct Outstanding {
    nonce: String,
    sent: Instant,
    ticks: u32,
}

/// Tracks the outstanding liveness PING.
#[derive(Clone, Debug)]
pub struct PingTracker {
    interval: Duration,
    fraction: u32,
    failure_limit: u32,
    outstanding: Option<Outstanding>,
    failures: u32,
}

impl PingTracker {
    /// Create a tracker.
    pub fn new(interval: Duration, fraction: u32, failure_limit: u32) -> Self {
        PingTracker {
            interval,
            fraction: fraction.max(1),
            failure_limit: failure_limit.max(1),
            outstanding: None,
            failures: 0,
        }
    }

    /// Interval between ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether a PING is waiting for its PONG.
    pub fn is_waiting(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Advance one tick. `nonce` is used if a new PING is due.
    pub fn tick(&mut self, now: Instant, nonce: impl Into<String>) -> LivenessAction {
        let Some(outstanding) = self.outstanding.as_mut() else {
            return self.send(now, nonce.into());
        };

        outstanding.ticks += 1;
        if outstanding.ticks < self.fraction {
            return LivenessAction::Wait;
        }

        self.failures += 1;
        warn!(failures = self.failures, "ping timed out");
        if self.failures >= self.failure_limit {
            self.outstanding = None;
            return LivenessAction::Disconnect {
                failures: self.failures,
            };
        }
        let nonce = nonce.into();
        self.send(now, nonce.clone());
        LivenessAction::Failed {
            failures: self.failures,
            nonce,
        }
    }

    fn send(&mut self, now: Instant, nonce: String) -> LivenessAction {
        self.outstanding = Some(Outstanding {
            nonce: nonce.clone(),
            sent: now,
            ticks: 0,
        });
        LivenessAction::SendPing(nonce)
    }

    /// Record a PONG. Returns the lag when it answers the outstanding PING.
    pub fn pong(&mut self, nonce: &str, now: Instant) -> Option<Duration> {
        let outstanding = self.outstanding.as_ref()?;
        if outstanding.nonce != nonce {
            debug!(nonce, "ignoring PONG with unknown nonce");
            return None;
        }
        let lag = now.saturating_duration_since(outstanding.sent);
        self.outstanding = None;
        self.failures = 0;
        Some(lag)
    }

    /// Forget the outstanding PING and failure count.
    pub fn reset(&mut self) {
        self.outstanding = None;
        self.failures = 0;
    }
}
