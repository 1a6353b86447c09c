//! opsguard-gateway — request-path guards in front of the application.
//!
//! A [`Gateway`] composes two independently-stateful guards:
//!
//! - a per-client fixed-window [`RateLimiter`], consulted first
//! - a [`CircuitBreaker`] that fails fast while the upstream keeps
//!   returning 5xx
//!
//! [`middleware::guard`] wires both into an axum router. [`UpstreamProxy`]
//! forwards admitted requests to the protected application.

pub mod circuit_breaker;
pub mod middleware;
pub mod proxy;
pub mod rate_limiter;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use opsguard_core::config::{GatewayConfig, duration_or};
use opsguard_core::{CircuitBreakerState, Clock, RateLimiterEntry};

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitOpen};
pub use proxy::UpstreamProxy;
pub use rate_limiter::{RateLimitInfo, RateLimited, RateLimiter};

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    admitted: AtomicU64,
    rejected_by_breaker: AtomicU64,
    rejected_by_limiter: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCounters {
    pub total_requests: u64,
    pub admitted: u64,
    pub rejected_by_breaker: u64,
    pub rejected_by_limiter: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterStatus {
    pub max_requests: u32,
    pub window_seconds: u64,
    pub active_clients: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub circuit_breaker: CircuitBreakerState,
    pub rate_limiter: RateLimiterStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMetrics {
    pub counters: GatewayCounters,
    pub circuit_breaker: CircuitBreakerState,
    pub rate_limiter: Vec<RateLimiterEntry>,
}

pub struct Gateway {
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    counters: Counters,
}

impl Gateway {
    pub fn new(breaker: CircuitBreaker, limiter: RateLimiter) -> Self {
        Self {
            breaker,
            limiter,
            counters: Counters::default(),
        }
    }

    pub fn from_config(config: &GatewayConfig, clock: Arc<dyn Clock>) -> Self {
        let breaker = CircuitBreaker::new(
            clock.clone(),
            config.failure_threshold,
            duration_or(&config.open_timeout, Duration::from_secs(60)),
        );
        let limiter = RateLimiter::new(
            clock,
            config.max_requests,
            duration_or(&config.window, Duration::from_secs(60)),
        );
        Self::new(breaker, limiter)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            circuit_breaker: self.breaker.snapshot(),
            rate_limiter: RateLimiterStatus {
                max_requests: self.limiter.max_requests(),
                window_seconds: self.limiter.window().as_secs(),
                active_clients: self.limiter.active_clients(),
            },
        }
    }

    pub fn counters(&self) -> GatewayCounters {
        GatewayCounters {
            total_requests: self.counters.total.load(Ordering::Relaxed),
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            rejected_by_breaker: self.counters.rejected_by_breaker.load(Ordering::Relaxed),
            rejected_by_limiter: self.counters.rejected_by_limiter.load(Ordering::Relaxed),
        }
    }

    pub fn metrics(&self) -> GatewayMetrics {
        GatewayMetrics {
            counters: self.counters(),
            circuit_breaker: self.breaker.snapshot(),
            rate_limiter: self.limiter.snapshot(),
        }
    }
}
