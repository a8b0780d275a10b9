//! Circuit breaker gating connection creation.
//!
//! The breaker protects a struggling server from a reconnect storm: after
//! enough consecutive creation failures it opens and denies further
//! attempts for an exponentially growing period. It gates *creation* only,
//! never steady-state traffic.
//!
//! State transitions:
//!
//! - **Closed -> Open**: consecutive failures reach the tolerance
//! - **Open -> HalfOpen**: the open period elapses
//! - **HalfOpen -> Closed**: the single probing attempt succeeds
//! - **HalfOpen -> Open**: the probe fails or exceeds its deadline
//!
//! The breaker is a pure decision object: it owns no timers and never reads
//! the clock itself. The pool passes `now` in, polls
//! [`CircuitBreaker::try_acquire`] before creating, and reports outcomes
//! with [`CircuitBreaker::record_success`] / [`CircuitBreaker::record_failure`].

use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive creation failures tolerated before the circuit opens.
    ///
    /// Must be at least 1. Default: 3
    pub failure_tolerance: u32,
    /// First open period; later episodes double it up to `open_cap`.
    ///
    /// Default: 1 second
    pub open_base: Duration,
    /// Upper bound on the open period.
    ///
    /// Default: 30 seconds
    pub open_cap: Duration,
    /// Deadline for a creation attempt to reach readiness.
    ///
    /// An attempt still not ready after this long counts as a failure.
    /// Default: 5 seconds
    pub half_open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_tolerance: 3,
            open_base: Duration::from_secs(1),
            open_cap: Duration::from_secs(30),
            half_open_timeout: Duration::from_secs(5),
        }
    }
}

/// Current breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Creations may proceed; counts consecutive failures so far.
    Closed { failures: u32 },
    /// Creations are denied until the stored instant.
    Open { until: Instant },
    /// One probing creation is permitted.
    HalfOpen,
}

/// Pure creation-gating decision object.
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    /// Completed open episodes; indexes the open-period sequence.
    episodes: u32,
    /// A half-open probe has been handed out and has not resolved yet.
    probing: bool,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        let config = BreakerConfig {
            failure_tolerance: config.failure_tolerance.max(1),
            ..config
        };
        Self {
            config,
            state: BreakerState::Closed { failures: 0 },
            episodes: 0,
            probing: false,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Decides whether one creation attempt may start at `now`.
    ///
    /// In `HalfOpen` at most one acquisition succeeds until the probe's
    /// outcome is recorded; the caller must therefore only call this when
    /// it will actually attempt a creation.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.tick(now);
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { .. } => false,
            BreakerState::HalfOpen => {
                if self.probing {
                    false
                } else {
                    self.probing = true;
                    true
                }
            }
        }
    }

    /// Records a creation that reached readiness in time.
    pub fn record_success(&mut self) {
        self.probing = false;
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Records a creation that failed or missed its readiness deadline.
    pub fn record_failure(&mut self, now: Instant) {
        self.tick(now);
        match self.state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_tolerance {
                    self.open(now);
                } else {
                    self.state = BreakerState::Closed { failures };
                }
            }
            BreakerState::HalfOpen => self.open(now),
            // A stale outcome from before the circuit opened changes nothing.
            BreakerState::Open { .. } => {}
        }
    }

    /// When the circuit is open, the instant creation becomes worth
    /// retrying; the pool schedules its wake-up here.
    pub fn next_attempt_at(&self) -> Option<Instant> {
        match self.state {
            BreakerState::Open { until } => Some(until),
            _ => None,
        }
    }

    fn tick(&mut self, now: Instant) {
        if let BreakerState::Open { until } = self.state {
            if now >= until {
                self.state = BreakerState::HalfOpen;
                self.probing = false;
            }
        }
    }

    fn open(&mut self, now: Instant) {
        let period = self.open_period(self.episodes);
        self.episodes += 1;
        self.probing = false;
        self.state = BreakerState::Open { until: now + period };
    }

    /// The n-th open period: base doubling up to the cap, plus up to 10%
    /// additive jitter so recovering pools do not reconnect in lockstep.
    fn open_period(&self, episode: u32) -> Duration {
        let base_ms = self.config.open_base.as_millis() as u64;
        let cap_ms = self.config.open_cap.as_millis() as u64;
        let doubled = base_ms.saturating_mul(1u64 << episode.min(20));
        let period_ms = doubled.min(cap_ms.max(base_ms));
        let jitter_ms = if period_ms > 0 {
            rand::random::<u64>() % (period_ms / 10 + 1)
        } else {
            0
        };
        Duration::from_millis(period_ms + jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(tolerance: u32, base_ms: u64, cap_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_tolerance: tolerance,
            open_base: Duration::from_millis(base_ms),
            open_cap: Duration::from_millis(cap_ms),
            half_open_timeout: Duration::from_millis(100),
        })
    }

    #[test]
    fn test_closed_permits_creation() {
        let mut b = breaker(2, 100, 1000);
        let now = Instant::now();
        assert!(b.try_acquire(now));
        assert!(b.try_acquire(now));
    }

    #[test]
    fn test_opens_after_tolerance_failures() {
        let mut b = breaker(2, 100, 1000);
        let now = Instant::now();
        b.record_failure(now);
        assert!(b.try_acquire(now), "one failure stays closed");
        b.record_failure(now);

        let BreakerState::Open { until } = b.state() else {
            panic!("breaker should be open");
        };
        // First episode lasts at least the base period.
        assert!(until.duration_since(now) >= Duration::from_millis(100));
        assert!(!b.try_acquire(now));
        assert!(!b.try_acquire(now + Duration::from_millis(50)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut b = breaker(3, 100, 1000);
        let now = Instant::now();
        b.record_failure(now);
        b.record_failure(now);
        b.record_success();
        b.record_failure(now);
        b.record_failure(now);
        assert!(matches!(b.state(), BreakerState::Closed { failures: 2 }));
        assert!(b.try_acquire(now));
    }

    #[test]
    fn test_half_open_permits_exactly_one_probe() {
        let mut b = breaker(1, 100, 1000);
        let now = Instant::now();
        b.record_failure(now);

        // Past the open period (base + 10% jitter at most).
        let later = now + Duration::from_millis(111);
        assert!(b.try_acquire(later), "first acquisition is the probe");
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(!b.try_acquire(later), "no second probe while one is in flight");

        b.record_success();
        assert!(matches!(b.state(), BreakerState::Closed { failures: 0 }));
        assert!(b.try_acquire(later));
    }

    #[test]
    fn test_failed_probe_doubles_the_open_period() {
        let mut b = breaker(1, 100, 10_000);
        let t0 = Instant::now();
        b.record_failure(t0);

        let t1 = t0 + Duration::from_millis(111);
        assert!(b.try_acquire(t1));
        b.record_failure(t1);

        let BreakerState::Open { until } = b.state() else {
            panic!("breaker should re-open");
        };
        // Second episode lasts at least twice the base.
        assert!(until.duration_since(t1) >= Duration::from_millis(200));
    }

    #[test]
    fn test_open_period_caps() {
        let b = breaker(1, 100, 400);
        for episode in 0..40 {
            let period = b.open_period(episode);
            // Cap plus at most 10% jitter.
            assert!(period <= Duration::from_millis(440), "episode {}", episode);
        }
        // Monotone non-decreasing lower bounds: 100, 200, 400, 400, ...
        assert!(b.open_period(0) >= Duration::from_millis(100));
        assert!(b.open_period(1) >= Duration::from_millis(200));
        assert!(b.open_period(2) >= Duration::from_millis(400));
        assert!(b.open_period(3) >= Duration::from_millis(400));
    }

    #[test]
    fn test_tolerance_below_one_is_clamped() {
        let mut b = CircuitBreaker::new(BreakerConfig {
            failure_tolerance: 0,
            ..Default::default()
        });
        let now = Instant::now();
        b.record_failure(now);
        assert!(matches!(b.state(), BreakerState::Open { .. }));
    }
}
