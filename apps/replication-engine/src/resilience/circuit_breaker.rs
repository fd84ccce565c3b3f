//! Circuit breaker shielding target venues.
//!
//! One breaker per venue, keyed by venue name. Calls are admitted while the
//! circuit is closed; a run of classified failures opens it, a cooldown
//! moves it to half-open, and a probing success closes it again.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (consecutive classified failures >= threshold)
//! OPEN → HALF_OPEN (cooldown elapsed)
//! HALF_OPEN → CLOSED (probe succeeds)
//! HALF_OPEN → OPEN (probe fails)
//! ```
//!
//! Classification happens in the resilient wrapper: only errors the
//! classifier attributes to the venue being unhealthy are recorded as
//! failures here.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without reaching the venue.
    Open,
    /// A limited number of probe calls is admitted.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive classified failures that open the circuit.
    pub failure_threshold: u32,
    /// Time to stay open before admitting probes.
    pub open_cooldown: Duration,
    /// Probe calls admitted while half-open.
    pub half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_cooldown: Duration::from_secs(60),
            half_open_probes: 1,
        }
    }
}

/// Circuit breaker for one target venue.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Venue name, used in transition logs.
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    /// Failures since the last success while closed.
    consecutive_failures: AtomicU32,
    /// When the circuit opened, for the cooldown clock.
    opened_at: RwLock<Option<Instant>>,
    /// Probes admitted in the current half-open period.
    half_open_calls: AtomicU32,
}

impl CircuitBreaker {
    /// Create a breaker for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            half_open_calls: AtomicU32::new(0),
        }
    }

    /// Venue this breaker guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying the cooldown transition first.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.check_cooldown();
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether a call may be attempted right now.
    ///
    /// In half-open this also reserves one of the probe slots, so callers
    /// must follow up with [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                let slot = self.half_open_calls.fetch_add(1, Ordering::Relaxed);
                slot < self.config.half_open_probes
            }
        }
    }

    /// Record a call the classifier counted as a success.
    pub fn record_success(&self) {
        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match state {
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => self.transition_to(CircuitState::Closed),
            CircuitState::Open => {}
        }
    }

    /// Record a call the classifier counted as a failure.
    pub fn record_failure(&self) {
        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match state {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition_to(CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    /// Apply OPEN → HALF_OPEN once the cooldown elapsed.
    fn check_cooldown(&self) {
        let state = *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if state == CircuitState::Open
            && let Some(opened) = *self
                .opened_at
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
            && opened.elapsed() >= self.config.open_cooldown
        {
            self.transition_to(CircuitState::HalfOpen);
        }
    }

    fn transition_to(&self, next: CircuitState) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;
        if previous == next {
            return;
        }
        *state = next;
        drop(state);

        match next {
            CircuitState::Open => {
                let mut opened_at = self
                    .opened_at
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                *opened_at = Some(Instant::now());
                drop(opened_at);
                tracing::warn!(venue = %self.name, from = %previous, "Circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                self.half_open_calls.store(0, Ordering::Relaxed);
                tracing::info!(venue = %self.name, from = %previous, "Circuit breaker probing");
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                let mut opened_at = self
                    .opened_at
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                *opened_at = None;
                drop(opened_at);
                tracing::info!(venue = %self.name, from = %previous, "Circuit breaker closed");
            }
        }

        crate::observability::record_circuit_transition(&self.name, &next.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_cooldown: cooldown,
                half_open_probes: 1,
            },
        )
    }

    #[test]
    fn starts_closed() {
        let cb = breaker(5, Duration::from_secs(60));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire());
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = breaker(3, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_acquire());
    }

    #[test]
    fn success_resets_the_failure_run() {
        let cb = breaker(3, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn cooldown_admits_probe() {
        let cb = breaker(1, Duration::from_millis(10));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire());
        // Only one probe slot by default.
        assert!(!cb.try_acquire());
    }

    #[test]
    fn probe_success_closes() {
        let cb = breaker(1, Duration::from_millis(10));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.try_acquire());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire());
    }

    #[test]
    fn probe_failure_reopens() {
        let cb = breaker(1, Duration::from_secs(60));
        cb.record_failure();
        {
            let mut opened = cb.opened_at.write().unwrap();
            *opened = Some(Instant::now() - Duration::from_secs(120));
        }
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_acquire());
    }
}
