//! Fixed-window rate limiter keyed by client identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use opsguard_core::{Clock, RateLimiterEntry, Timestamp};

/// Quota left after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Timestamp,
}

/// Rejection once a client has exhausted its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub limit: u32,
    pub reset_at: Timestamp,
    pub retry_after_secs: u64,
}

struct Window {
    count: u32,
    reset_at: Timestamp,
}

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>, max_requests: u32, window: Duration) -> Self {
        Self {
            clock,
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request from `client`.
    ///
    /// Rejected requests still count against the window.
    pub fn check(&self, client: &str) -> Result<RateLimitInfo, RateLimited> {
        let now = self.clock.now_ms();
        let mut clients = self.clients.lock().expect("rate limiter lock");

        let window = clients.entry(client.to_string()).or_insert(Window {
            count: 0,
            reset_at: now,
        });
        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window.as_millis() as u64;
        }
        window.count = window.count.saturating_add(1);

        if window.count > self.max_requests {
            debug!(client, count = window.count, "rate limit exceeded");
            return Err(RateLimited {
                limit: self.max_requests,
                reset_at: window.reset_at,
                retry_after_secs: (window.reset_at - now).div_ceil(1000).max(1),
            });
        }

        Ok(RateLimitInfo {
            limit: self.max_requests,
            remaining: self.max_requests - window.count,
            reset_at: window.reset_at,
        })
    }

    /// Drop clients whose window has ended; returns how many.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut clients = self.clients.lock().expect("rate limiter lock");
        let before = clients.len();
        clients.retain(|_, w| w.reset_at > now);
        before - clients.len()
    }

    pub fn active_clients(&self) -> usize {
        self.clients.lock().expect("rate limiter lock").len()
    }

    /// Current windows, sorted by client.
    pub fn snapshot(&self) -> Vec<RateLimiterEntry> {
        let clients = self.clients.lock().expect("rate limiter lock");
        let mut entries: Vec<RateLimiterEntry> = clients
            .iter()
            .map(|(id, w)| RateLimiterEntry {
                client_id: id.clone(),
                count: w.count,
                window_reset_at: w.reset_at,
            })
            .collect();
        entries.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsguard_core::ManualClock;

    const T0: u64 = 5_000_000;

    fn limiter() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = RateLimiter::new(clock.clone(), 100, Duration::from_secs(60));
        (clock, limiter)
    }

    #[test]
    fn hundred_and_first_request_is_rejected() {
        let (clock, limiter) = limiter();
        for i in 1..=100 {
            let info = limiter.check("10.0.0.1").unwrap();
            assert_eq!(info.remaining, 100 - i);
        }

        clock.advance(Duration::from_secs(20));
        let rejected = limiter.check("10.0.0.1").unwrap_err();
        assert_eq!(rejected.limit, 100);
        assert_eq!(rejected.retry_after_secs, 40);
        assert!(rejected.retry_after_secs <= 60);
    }

    #[test]
    fn next_window_starts_fresh() {
        let (clock, limiter) = limiter();
        for _ in 0..101 {
            let _ = limiter.check("a");
        }
        clock.advance(Duration::from_secs(60));

        let info = limiter.check("a").unwrap();
        assert_eq!(info.remaining, 99);
        assert_eq!(info.reset_at, T0 + 120_000);
    }

    #[test]
    fn clients_are_independent() {
        let (_, limiter) = limiter();
        for _ in 0..101 {
            let _ = limiter.check("noisy");
        }
        assert!(limiter.check("noisy").is_err());
        assert_eq!(limiter.check("quiet").unwrap().remaining, 99);
    }

    #[test]
    fn purge_drops_finished_windows() {
        let (clock, limiter) = limiter();
        limiter.check("a").unwrap();
        clock.advance(Duration::from_secs(30));
        limiter.check("b").unwrap();
        assert_eq!(limiter.active_clients(), 2);

        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.purge_expired(), 1);
        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].client_id, "b");
        assert_eq!(snapshot[0].count, 1);
    }
}
