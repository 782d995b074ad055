//! Circuit breaker guarding one egress identity.
//!
//! Stops routing requests through an egress path that keeps getting
//! blocked, and periodically re-tests it.
//!
//! # Circuit States
//!
//! ```text
//! CLOSED (healthy) --[N failures]--> OPEN (rejecting) --[timeout]--> HALF_OPEN (probing)
//!                                                                         |
//!                                       <--[failure]--                    |
//!                                                                         |
//! CLOSED <---------------------------[success]----------------------------+
//! ```
//!
//! Each reopening doubles the reset timeout, up to a cap, so a
//! persistently hostile target backs the breaker off further each time.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed - requests flow normally.
    Closed,
    /// Circuit is open - requests are rejected immediately.
    Open,
    /// Circuit is half-open - one trial request allowed to test recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// Time to wait before transitioning from Open to Half-Open.
    pub reset_timeout: Duration,

    /// Each reopening multiplies the current reset timeout by this factor.
    pub reopen_backoff_multiplier: f32,

    /// Maximum reset timeout after repeated reopenings.
    pub max_reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(300),
            reopen_backoff_multiplier: 2.0,
            max_reset_timeout: Duration::from_secs(1800),
        }
    }
}

/// Internal state tracking for the circuit breaker.
#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    last_reason: Option<String>,
    current_reset_timeout: Duration,
}

impl CircuitBreakerInner {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            last_reason: None,
            current_reset_timeout: config.reset_timeout,
        }
    }
}

/// Statistics about circuit breaker state for monitoring.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_reason: Option<String>,
    pub time_until_half_open: Option<Duration>,
}

/// Thread-safe circuit breaker, one per egress rotation key.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<CircuitBreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let inner = CircuitBreakerInner::new(&config);
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CircuitBreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Returns the current state, handling lazy Open → HalfOpen transitions.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    /// True when a request may be routed through this egress right now
    /// (Closed, or Open with an elapsed timeout — the Half-Open trial).
    pub fn allows_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        let time_until_half_open = if inner.state == CircuitState::Open {
            inner.last_failure_time.map(|t| {
                let elapsed = t.elapsed();
                if elapsed < inner.current_reset_timeout {
                    inner.current_reset_timeout - elapsed
                } else {
                    Duration::ZERO
                }
            })
        } else {
            None
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_reason: inner.last_reason.clone(),
            time_until_half_open,
        }
    }

    /// Record a successful request: close the circuit and zero the
    /// failure count (a Half-Open trial success also fully recovers the
    /// base reset timeout).
    pub fn record_success(&self) {
        let mut inner = self.lock_inner();

        match inner.state {
            CircuitState::HalfOpen => {
                tracing::info!(circuit = %self.name, "Circuit breaker closing after successful probe");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.last_reason = None;
                inner.current_reset_timeout = self.config.reset_timeout;
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a block or failure attributed to this egress.
    pub fn record_failure(&self, reason: &str) {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());
                inner.last_reason = Some(reason.to_string());

                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.failure_count,
                        reason = %reason,
                        "Circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    circuit = %self.name,
                    reason = %reason,
                    "Circuit breaker probe failed, reopening with longer timeout"
                );
                inner.state = CircuitState::Open;
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());
                inner.last_reason = Some(reason.to_string());
                inner.current_reset_timeout = std::cmp::min(
                    Duration::from_secs_f32(
                        inner.current_reset_timeout.as_secs_f32()
                            * self.config.reopen_backoff_multiplier,
                    ),
                    self.config.max_reset_timeout,
                );
            }
            CircuitState::Open => {
                inner.last_reason = Some(reason.to_string());
            }
        }
    }

    /// Force the circuit closed (last-resort recovery when every egress
    /// is open at once).
    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        tracing::info!(circuit = %self.name, "Circuit breaker reset");
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
        inner.last_reason = None;
        inner.current_reset_timeout = self.config.reset_timeout;
    }

    fn maybe_transition_to_half_open(&self, inner: &mut CircuitBreakerInner) {
        if inner.state == CircuitState::Open {
            if let Some(last_failure) = inner.last_failure_time {
                if last_failure.elapsed() >= inner.current_reset_timeout {
                    tracing::info!(
                        circuit = %self.name,
                        "Circuit breaker transitioning to half-open state"
                    );
                    inner.state = CircuitState::HalfOpen;
                }
            }
        }
    }
}
