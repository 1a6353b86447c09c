//! Circuit breaker — stops calling a failing upstream for a cooldown.
//!
//! ```text
//!            threshold 5xx                timeout elapsed
//!  Closed ───────────────────▶ Open ─────────────────────▶ HalfOpen
//!    ▲                          ▲                             │
//!    │        trial succeeds    │       trial fails           │
//!    └──────────────────────────┼─────────────────────────────┤
//!                               └─────────────────────────────┘
//! ```
//!
//! Half-open admits exactly one trial request. Concurrent requests during
//! the trial are rejected with a one-second retry hint. A trial whose
//! outcome is never recorded (client went away) is abandoned after another
//! full timeout so the breaker cannot wedge half-open.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use opsguard_core::{CircuitBreakerState, CircuitState, Clock, Timestamp};

/// How a request got through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    Trial,
}

/// Rejection while the breaker is open or a trial is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpen {
    pub retry_after_secs: u64,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_time: Option<Timestamp>,
    trial_started: Option<Timestamp>,
}

pub struct CircuitBreaker {
    clock: Arc<dyn Clock>,
    failure_threshold: u32,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(clock: Arc<dyn Clock>, failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            clock,
            failure_threshold: failure_threshold.max(1),
            timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_time: None,
                trial_started: None,
            }),
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Decide whether a request may reach the protected call.
    pub fn admit(&self) -> Result<Admission, CircuitOpen> {
        let now = self.clock.now_ms();
        let timeout_ms = self.timeout_ms();
        let mut inner = self.inner.lock().expect("circuit breaker lock");

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = now.saturating_sub(inner.last_failure_time.unwrap_or(now));
                if elapsed >= timeout_ms {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started = Some(now);
                    info!("circuit half-open, admitting trial request");
                    Ok(Admission::Trial)
                } else {
                    Err(CircuitOpen {
                        retry_after_secs: ceil_secs(timeout_ms - elapsed),
                    })
                }
            }
            CircuitState::HalfOpen => match inner.trial_started {
                Some(started) if now.saturating_sub(started) < timeout_ms => {
                    Err(CircuitOpen { retry_after_secs: 1 })
                }
                _ => {
                    inner.trial_started = Some(now);
                    Ok(Admission::Trial)
                }
            },
        }
    }

    /// Record the outcome of an admitted request.
    pub fn record(&self, admission: Admission, success: bool) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().expect("circuit breaker lock");

        if admission == Admission::Trial {
            inner.trial_started = None;
            if success {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                info!("trial request succeeded, circuit closed");
            } else {
                inner.state = CircuitState::Open;
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                inner.last_failure_time = Some(now);
                warn!("trial request failed, circuit reopened");
            }
            return;
        }

        if success {
            if inner.state == CircuitState::Closed {
                inner.consecutive_failures = 0;
            }
            return;
        }

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_time = Some(now);
        if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.failure_threshold
        {
            inner.state = CircuitState::Open;
            warn!(
                failures = inner.consecutive_failures,
                timeout_secs = self.timeout.as_secs(),
                "circuit opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker lock").state
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.inner.lock().expect("circuit breaker lock");
        CircuitBreakerState {
            consecutive_failures: inner.consecutive_failures,
            last_failure_time: inner.last_failure_time,
            state: inner.state,
            failure_threshold: self.failure_threshold,
            timeout_seconds: self.timeout.as_secs(),
        }
    }

    /// Force the breaker closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock");
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_started = None;
        info!("circuit breaker reset");
    }
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000).max(1)
}
