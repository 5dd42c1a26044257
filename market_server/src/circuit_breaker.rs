//! Circuit breaker guarding one fallible upstream call site.
//!
//! States:
//! - `Closed` — calls pass through; consecutive failures are counted.
//! - `Open` — calls fail fast with `ServiceError::CircuitOpen` until `reset_timeout` has
//!   elapsed since the last failure.
//! - `HalfOpen` — the first call after the cooldown runs as a probe; success closes the
//!   circuit, failure re-opens it at once because the counter is still at or above the
//!   threshold.
//!
//! The state check and the outcome bookkeeping are two separate critical sections and
//! the action itself runs with no lock held. By default every caller that arrives
//! while the circuit is half-open is let through, so several probes may run
//! concurrently. With `BreakerConfig::single_probe` the caller that performs the
//! Open → HalfOpen transition reserves the probe and everyone else is rejected until
//! it resolves.
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{info, warn};
use market_common::config::BreakerConfig;
use market_common::{Result, ServiceError};
use strum_macros::Display;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CircuitState {
    /// Calls pass through.
    #[strum(serialize = "CLOSED")]
    Closed,
    /// Calls are rejected without being attempted.
    #[strum(serialize = "OPEN")]
    Open,
    /// A probe is allowed through to test recovery.
    #[strum(serialize = "HALF-OPEN")]
    HalfOpen,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Consecutive-failure circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker. `name` only appears in log lines.
    pub fn new(name: &str, config: BreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Runs `action` through the breaker.
    ///
    /// Returns `ServiceError::CircuitOpen` without calling `action` while the circuit
    /// is open; otherwise returns whatever `action` returned after recording its
    /// outcome. An `action` that panics is recorded as a failure while unwinding.
    pub fn execute<T, F>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut pending = Pending {
            breaker: self,
            probe: self.admit()?,
            success: false,
        };
        let outcome = action();
        pending.success = outcome.is_ok();
        outcome
    }

    /// First critical section: decides whether the call may run. Returns `true` when
    /// the caller holds the single-probe reservation.
    fn admit(&self) -> Result<bool> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_at
                    .is_none_or(|at| at.elapsed() > self.config.reset_timeout);
                if !cooled_down {
                    return Err(ServiceError::CircuitOpen);
                }
                info!("[{}] Circuit transitioning to HALF-OPEN", self.name);
                inner.state = CircuitState::HalfOpen;
                Ok(self.reserve_probe(&mut inner))
            }
            CircuitState::HalfOpen if self.config.single_probe => {
                if inner.probe_in_flight {
                    return Err(ServiceError::CircuitOpen);
                }
                Ok(self.reserve_probe(&mut inner))
            }
            CircuitState::HalfOpen | CircuitState::Closed => Ok(false),
        }
    }

    fn reserve_probe(&self, inner: &mut BreakerState) -> bool {
        if self.config.single_probe {
            inner.probe_in_flight = true;
        }
        self.config.single_probe
    }

    /// Second critical section: books the outcome.
    fn record(&self, success: bool, probe: bool) {
        let mut inner = self.lock();
        if probe {
            inner.probe_in_flight = false;
        }

        if !success {
            inner.failure_count += 1;
            inner.last_failure_at = Some(Instant::now());
            warn!(
                "[{}] Failure detected. Count: {}/{}",
                self.name, inner.failure_count, self.config.threshold
            );
            if inner.failure_count >= self.config.threshold && inner.state != CircuitState::Open {
                warn!("[{}] Failure threshold reached. Circuit OPEN.", self.name);
                inner.state = CircuitState::Open;
            }
            return;
        }

        match inner.state {
            CircuitState::HalfOpen => {
                info!("[{}] Success in HALF-OPEN. Circuit CLOSED.", self.name);
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
            }
            CircuitState::Closed => inner.failure_count = 0,
            // Opened by a concurrent caller while this call was in flight.
            CircuitState::Open => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An admitted call whose outcome is booked when this is dropped, on return or unwind.
struct Pending<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    success: bool,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.breaker.record(self.success, self.probe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn breaker(threshold: u32, reset_ms: u64, single_probe: bool) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                threshold,
                reset_timeout: Duration::from_millis(reset_ms),
                single_probe,
            },
        )
    }

    fn fail() -> Result<u32> {
        Err(ServiceError::Remote("service error".into()))
    }

    fn open(cb: &CircuitBreaker, threshold: u32) {
        for _ in 0..threshold {
            assert!(cb.execute(fail).is_err());
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn opens_after_threshold_and_rejects_without_calling() {
        let cb = breaker(3, 10_000, false);
        assert!(cb.execute(fail).is_err());
        assert!(cb.execute(fail).is_err());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.execute(fail).is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        let calls = AtomicUsize::new(0);
        let result = cb.execute(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        assert!(matches!(result, Err(ServiceError::CircuitOpen)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn success_in_closed_resets_counter() {
        let cb = breaker(3, 10_000, false);
        cb.execute(fail).unwrap_err();
        cb.execute(fail).unwrap_err();
        assert_eq!(cb.failure_count(), 2);
        assert_eq!(cb.execute(|| Ok(7)).unwrap(), 7);
        assert_eq!(cb.failure_count(), 0);
        cb.execute(fail).unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_success_closes() {
        let cb = breaker(2, 50, false);
        open(&cb, 2);
        thread::sleep(Duration::from_millis(80));

        assert_eq!(cb.execute(|| Ok(42)).unwrap(), 42);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn half_open_probe_failure_reopens_immediately() {
        let cb = breaker(2, 50, false);
        open(&cb, 2);
        thread::sleep(Duration::from_millis(80));

        assert!(matches!(cb.execute(fail), Err(ServiceError::Remote(_))));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.execute(|| Ok(1)), Err(ServiceError::CircuitOpen)));
    }

    #[test]
    fn concurrent_probes_are_let_through_by_default() {
        let cb = Arc::new(breaker(1, 20, false));
        open(&cb, 1);
        thread::sleep(Duration::from_millis(40));

        let (release_tx, release_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);
        let probe = {
            let cb = Arc::clone(&cb);
            thread::spawn(move || {
                cb.execute(|| {
                    started_tx.send(()).ok();
                    release_rx.recv().ok();
                    Ok(1)
                })
            })
        };
        started_rx.recv().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert_eq!(cb.execute(|| Ok(2)).unwrap(), 2);
        release_tx.send(()).unwrap();
        assert_eq!(probe.join().unwrap().unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn single_probe_rejects_concurrent_callers() {
        let cb = Arc::new(breaker(1, 20, true));
        open(&cb, 1);
        thread::sleep(Duration::from_millis(40));

        let (release_tx, release_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);
        let probe = {
            let cb = Arc::clone(&cb);
            thread::spawn(move || {
                cb.execute(|| {
                    started_tx.send(()).ok();
                    release_rx.recv().ok();
                    Ok(1)
                })
            })
        };
        started_rx.recv().unwrap();

        assert!(matches!(cb.execute(|| Ok(2)), Err(ServiceError::CircuitOpen)));
        release_tx.send(()).unwrap();
        assert_eq!(probe.join().unwrap().unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.execute(|| Ok(3)).unwrap(), 3);
    }

    #[test]
    fn panicking_half_open_call_releases_the_reservation() {
        let cb = breaker(1, 20, true);
        open(&cb, 1);
        thread::sleep(Duration::from_millis(40));

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
            cb.execute(|| -> Result<u32> { panic!("upstream call panicked") })
        }));
        assert!(unwound.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 2);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(cb.execute(|| Ok(1)).unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
