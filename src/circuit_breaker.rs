/*!
 * # ERP circuit breaker (C6)
 *
 * A sliding-window error-rate breaker consulted by the outbox worker before every ERP call.
 * Unlike a simple consecutive-failure counter, `closed` only trips to `open` once a minimum
 * number of samples have been observed *and* the failure rate within the window crosses the
 * configured threshold, so a single early failure does not trip a breaker sitting in front of an
 * otherwise healthy ERP.
 */

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::ErpCircuitConfig;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Error, Debug)]
pub enum CircuitBreakerError {
    #[error("circuit breaker is open")]
    CircuitOpen,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    success: bool,
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    window: VecDeque<Sample>,
    opened_at: Option<Instant>,
    half_open_calls_in_flight: u32,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            opened_at: None,
            half_open_calls_in_flight: 0,
        }
    }

    fn prune(&mut self, now: Instant, window_duration: Duration) {
        while let Some(front) = self.window.front() {
            if now.duration_since(front.at) > window_duration {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

fn lock(state: &Mutex<CircuitBreakerState>) -> std::sync::MutexGuard<'_, CircuitBreakerState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Sliding-window error-rate circuit breaker, shared across the outbox worker's tasks.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: ErpCircuitConfig,
    state: Arc<Mutex<CircuitBreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: ErpCircuitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(CircuitBreakerState::new())),
        }
    }

    pub fn state(&self) -> CircuitState {
        lock(&self.state).state
    }

    /// Returns `Ok(())` if a call may proceed, advancing `open` -> `half_open` once
    /// `open_seconds` have elapsed. A rejection here is a short-circuit: the caller should
    /// requeue the current attempt with backoff but must not feed it into `record_failure`,
    /// otherwise the breaker could never accumulate the successes needed to close again.
    pub fn try_acquire(&self) -> Result<(), CircuitBreakerError> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut state = lock(&self.state);
        state.prune(now, Duration::from_secs(self.config.window_seconds));

        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = state.opened_at.unwrap_or(now);
                if now.duration_since(opened_at) >= Duration::from_secs(self.config.open_seconds) {
                    state.state = CircuitState::HalfOpen;
                    state.half_open_calls_in_flight = 1;
                    Ok(())
                } else {
                    Err(CircuitBreakerError::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => {
                if state.half_open_calls_in_flight < self.config.half_open_max_calls {
                    state.half_open_calls_in_flight += 1;
                    Ok(())
                } else {
                    Err(CircuitBreakerError::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let now = Instant::now();
        let mut state = lock(&self.state);
        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Closed;
                state.window.clear();
                state.opened_at = None;
                state.half_open_calls_in_flight = 0;
            }
            CircuitState::Closed => {
                state.window.push_back(Sample { at: now, success: true });
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let window_duration = Duration::from_secs(self.config.window_seconds);
        let mut state = lock(&self.state);

        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.opened_at = Some(now);
                state.half_open_calls_in_flight = 0;
            }
            CircuitState::Closed => {
                state.window.push_back(Sample { at: now, success: false });
                state.prune(now, window_duration);

                let samples = state.window.len() as u32;
                if samples >= self.config.min_samples {
                    let failures = state.window.iter().filter(|s| !s.success).count() as f64;
                    let failure_rate = failures / samples as f64;
                    if failure_rate >= self.config.error_rate_threshold {
                        state.state = CircuitState::Open;
                        state.opened_at = Some(now);
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = lock(&self.state);
        let samples = state.window.len() as u64;
        let failures = state.window.iter().filter(|s| !s.success).count() as u64;
        CircuitBreakerMetrics {
            state: state.state,
            window_samples: samples,
            window_failures: failures,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub window_samples: u64,
    pub window_failures: u64,
}

impl CircuitBreakerMetrics {
    pub fn to_prometheus(&self, service_name: &str) -> String {
        let state_value = match self.state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };

        format!(
            r#"# HELP erp_circuit_breaker_state Current state (0=closed, 1=open, 2=half-open)
# TYPE erp_circuit_breaker_state gauge
erp_circuit_breaker_state{{service="{service}"}} {state}
# HELP erp_circuit_breaker_window_samples Samples currently held in the sliding window
# TYPE erp_circuit_breaker_window_samples gauge
erp_circuit_breaker_window_samples{{service="{service}"}} {samples}
# HELP erp_circuit_breaker_window_failures Failed samples currently held in the sliding window
# TYPE erp_circuit_breaker_window_failures gauge
erp_circuit_breaker_window_failures{{service="{service}"}} {failures}
"#,
            service = service_name,
            state = state_value,
            samples = self.window_samples,
            failures = self.window_failures,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(min_samples: u32, threshold: f64) -> ErpCircuitConfig {
        ErpCircuitConfig {
            enabled: true,
            error_rate_threshold: threshold,
            min_samples,
            window_seconds: 60,
            open_seconds: 30,
            half_open_max_calls: 2,
        }
    }

    #[test]
    fn stays_closed_below_min_samples() {
        let cb = CircuitBreaker::new(config(5, 0.5));
        for _ in 0..4 {
            cb.try_acquire().unwrap();
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn opens_once_failure_rate_crosses_threshold() {
        let cb = CircuitBreaker::new(config(4, 0.5));
        cb.try_acquire().unwrap();
        cb.record_failure();
        cb.try_acquire().unwrap();
        cb.record_failure();
        cb.try_acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.try_acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.try_acquire(), Err(CircuitBreakerError::CircuitOpen)));
    }

    #[test]
    fn half_open_success_closes_and_resets_window() {
        let cb = CircuitBreaker::new(config(2, 0.5));
        cb.try_acquire().unwrap();
        cb.record_failure();
        cb.try_acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        {
            let mut state = lock(&cb.state);
            state.opened_at = Some(Instant::now() - Duration::from_secs(31));
        }

        cb.try_acquire().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(config(2, 0.5));
        cb.try_acquire().unwrap();
        cb.record_failure();
        cb.try_acquire().unwrap();
        cb.record_failure();
        {
            let mut state = lock(&cb.state);
            state.opened_at = Some(Instant::now() - Duration::from_secs(31));
        }
        cb.try_acquire().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn disabled_breaker_always_permits() {
        let mut cfg = config(1, 0.1);
        cfg.enabled = false;
        let cb = CircuitBreaker::new(cfg);
        for _ in 0..10 {
            cb.try_acquire().unwrap();
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    proptest::proptest! {
        #[test]
        fn window_failures_never_exceed_window_samples(failure_count in 0u32..200, min_samples in 1u32..50) {
            // threshold above 1.0 can never trip, so the breaker stays closed and the window
            // keeps accumulating exactly what was recorded.
            let cb = CircuitBreaker::new(config(min_samples, 1.5));
            for _ in 0..failure_count {
                let _ = cb.try_acquire();
                cb.record_failure();
            }
            let metrics = cb.metrics();
            prop_assert!(metrics.window_failures <= metrics.window_samples);
            prop_assert_eq!(cb.state(), CircuitState::Closed);
        }
    }

    #[test]
    fn short_circuit_rejection_does_not_count_as_a_failure_sample() {
        let cb = CircuitBreaker::new(config(2, 0.5));
        cb.try_acquire().unwrap();
        cb.record_failure();
        cb.try_acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        for _ in 0..5 {
            assert!(cb.try_acquire().is_err());
        }
        assert_eq!(cb.metrics().window_samples, 2);
    }
}
