//! Metrics collector — periodically samples the host and request path
//! into the [`MetricStore`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use opsguard_core::{MINUTE_MS, OverallHealth, ServerHealth, names};
use opsguard_health::HealthAggregator;

use crate::provider::MetricsProvider;
use crate::store::MetricStore;
use crate::tracker::RequestTracker;

/// Window used for the response-time reading in the health snapshot.
const RESPONSE_TIME_WINDOW_MS: u64 = 5 * MINUTE_MS;

pub struct MetricsCollector {
    store: Arc<MetricStore>,
    provider: Arc<dyn MetricsProvider>,
    tracker: Arc<RequestTracker>,
    health: Arc<HealthAggregator>,
}

impl MetricsCollector {
    pub fn new(
        store: Arc<MetricStore>,
        provider: Arc<dyn MetricsProvider>,
        tracker: Arc<RequestTracker>,
        health: Arc<HealthAggregator>,
    ) -> Self {
        Self {
            store,
            provider,
            tracker,
            health,
        }
    }

    /// Run one collection tick and return the refreshed health snapshot.
    ///
    /// A failed host read leaves cpu and memory unknown for this tick.
    pub async fn collect(&self) -> ServerHealth {
        let now = self.store.clock().now_ms();

        let host = match self.provider.read().await {
            Ok(stats) => {
                self.store.record(names::CPU_USAGE, stats.cpu_usage, now, None);
                self.store.record(names::MEMORY_USAGE, stats.memory_usage, now, None);
                Some(stats)
            }
            Err(e) => {
                warn!(error = %e, "host stats read failed");
                None
            }
        };

        let window = self.tracker.drain();
        self.store
            .record(names::REQUEST_COUNT, window.requests as f64, now, None);
        self.store
            .record(names::ERROR_RATE, window.error_rate(), now, None);
        if let Some(latency) = window.mean_latency_ms() {
            self.store.record(names::RESPONSE_TIME, latency, now, None);
        }

        let active = self.tracker.in_flight();
        self.store
            .record(names::ACTIVE_CONNECTIONS, active as f64, now, None);

        let snapshot = ServerHealth {
            cpu_usage: host.map(|h| h.cpu_usage),
            memory_usage: host.map(|h| h.memory_usage),
            active_connections: active,
            response_time_ms: self
                .store
                .average(names::RESPONSE_TIME, now.saturating_sub(RESPONSE_TIME_WINDOW_MS)),
            last_check: now,
        };
        self.health.update_server(snapshot.clone());

        let overall = self.health.overall_health();
        let score = if overall == OverallHealth::Healthy { 1.0 } else { 0.0 };
        self.store.record(names::HEALTH_SCORE, score, now, None);

        debug!(
            requests = window.requests,
            errors = window.errors,
            active,
            overall = ?overall,
            "metrics collected"
        );
        snapshot
    }

    /// Run the collection loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "metrics collector started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.collect().await;
                }
                _ = shutdown.changed() => {
                    info!("metrics collector shutting down");
                    break;
                }
            }
        }
    }
}
