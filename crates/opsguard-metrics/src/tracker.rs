//! Request tracker — lock-free counters for the request path.
//!
//! The HTTP layer calls [`RequestTracker::begin`] when a request arrives
//! and [`RequestTracker::record`] when it completes. The collector drains
//! the counters once per tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RequestTracker {
    requests: AtomicU64,
    errors: AtomicU64,
    latency_ms_total: AtomicU64,
    in_flight: AtomicU64,
}

/// Counters accumulated since the previous drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestWindow {
    pub requests: u64,
    pub errors: u64,
    pub latency_ms_total: u64,
}

impl RequestWindow {
    /// Percentage of requests that ended in a 5xx.
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.errors as f64 / self.requests as f64 * 100.0
    }

    /// Mean latency, or `None` without traffic.
    pub fn mean_latency_ms(&self) -> Option<f64> {
        (self.requests > 0).then(|| self.latency_ms_total as f64 / self.requests as f64)
    }
}

/// Decrements the in-flight gauge when dropped.
pub struct InFlightGuard {
    tracker: Arc<RequestTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RequestTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a request as in flight until the guard drops.
    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Record a completed request.
    pub fn record(&self, latency_ms: u64, status: u16) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_ms_total.fetch_add(latency_ms, Ordering::Relaxed);
        if status >= 500 {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Take and reset the counters accumulated since the last drain.
    pub fn drain(&self) -> RequestWindow {
        RequestWindow {
            requests: self.requests.swap(0, Ordering::Relaxed),
            errors: self.errors.swap(0, Ordering::Relaxed),
            latency_ms_total: self.latency_ms_total.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_drain() {
        let tracker = RequestTracker::new();
        tracker.record(10, 200);
        tracker.record(30, 503);
        tracker.record(20, 404);

        let window = tracker.drain();
        assert_eq!(window.requests, 3);
        assert_eq!(window.errors, 1);
        assert_eq!(window.mean_latency_ms(), Some(20.0));
        assert!((window.error_rate() - 33.333).abs() < 0.01);

        // Drained counters start over.
        assert_eq!(tracker.drain(), RequestWindow::default());
    }

    #[test]
    fn empty_window_has_no_latency() {
        let window = RequestWindow::default();
        assert_eq!(window.mean_latency_ms(), None);
        assert_eq!(window.error_rate(), 0.0);
    }

    #[test]
    fn in_flight_guard_tracks_connections() {
        let tracker = RequestTracker::new();
        let a = tracker.begin();
        let b = tracker.begin();
        assert_eq!(tracker.in_flight(), 2);

        drop(a);
        assert_eq!(tracker.in_flight(), 1);
        drop(b);
        assert_eq!(tracker.in_flight(), 0);
    }
}
