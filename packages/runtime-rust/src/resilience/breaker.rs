//! Circuit breaker: a per-target call-outcome state machine.
//!
//! `closed` counts consecutive failures and opens at the configured
//! threshold. `open` rejects immediately until the cooldown elapses, then
//! admits exactly one trial call (`half-open`). A trial success closes the
//! breaker; a trial failure re-opens it and restarts the cooldown.

use std::time::Duration;

use parking_lot::Mutex;
use pars_core::RpcError;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for [`CircuitBreaker`].
///
/// The threshold and cooldown are deployment tuning knobs, not protocol
/// constants; the defaults suit a mid-latency downstream.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(30) }
    }
}

/// Externally observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Per-target breaker. All transitions run under one lock, so concurrent
/// completions against the same target cannot lose updates.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Gate to pass before touching the transport.
    ///
    /// # Errors
    ///
    /// [`RpcError::CircuitOpen`] with the remaining cooldown when the breaker
    /// is open, or with a one-second hint when a half-open trial is already
    /// in flight.
    pub fn try_acquire(&self) -> Result<(), RpcError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map_or(Duration::ZERO, |at| at.elapsed());
                if elapsed >= self.config.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(())
                } else {
                    let remaining = self.config.cooldown - elapsed;
                    Err(RpcError::CircuitOpen(secs_ceil(remaining)))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(RpcError::CircuitOpen(1))
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Undoes a successful `try_acquire` whose call never reached the
    /// transport (e.g. the bulkhead rejected it).
    pub fn cancel_acquire(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.trial_in_flight = false;
            }
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::Open => {}
        }
    }

    /// Records a failed call outcome (transport failure or error response).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
            }
            // A straggler completing after the breaker opened changes nothing.
            CircuitState::Open => {}
        }
    }

    /// Current state. An open breaker reports `Open` until the next
    /// `try_acquire` performs the half-open transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

/// Rounds a duration up to whole seconds, with a floor of one.
fn secs_ceil(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[test]
    fn stays_closed_below_threshold() {
        let cb = breaker(3, 1000);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let cb = breaker(3, 1000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn opens_at_threshold_and_rejects() {
        let cb = breaker(3, 1000);
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        let err = cb.try_acquire().unwrap_err();
        match err {
            RpcError::CircuitOpen(retry_after) => assert!(retry_after >= 1),
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_admits_exactly_one_trial() {
        let cb = breaker(1, 500);
        cb.record_failure();
        assert!(cb.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(600)).await;

        assert!(cb.try_acquire().is_ok(), "first post-cooldown call is the trial");
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_err(), "second concurrent call is rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn trial_success_closes() {
        let cb = breaker(1, 500);
        cb.record_failure();
        tokio::time::advance(Duration::from_millis(600)).await;
        cb.try_acquire().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn trial_failure_reopens_and_restarts_cooldown() {
        let cb = breaker(1, 500);
        cb.record_failure();
        tokio::time::advance(Duration::from_millis(600)).await;
        cb.try_acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(cb.try_acquire().is_ok(), "a fresh cooldown admits a new trial");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_acquire_releases_the_trial_slot() {
        let cb = breaker(1, 500);
        cb.record_failure();
        tokio::time::advance(Duration::from_millis(600)).await;
        cb.try_acquire().unwrap();
        cb.cancel_acquire();
        assert!(cb.try_acquire().is_ok(), "cancelled trial frees the slot");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_reflects_remaining_cooldown() {
        let cb = breaker(1, 10_000);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(4)).await;
        match cb.try_acquire().unwrap_err() {
            RpcError::CircuitOpen(retry_after) => assert_eq!(retry_after, 6),
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }
}
