//! Application context — every service object, wired once at startup.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use opsguard_alert::{AlertEngine, LogNotifier, Notifier};
use opsguard_autoscale::{
    HistoryForecast, InstanceDriver, LoadForecast, LocalDriver, ScalingController,
};
use opsguard_core::config::duration_or;
use opsguard_core::{Clock, OpsConfig, SystemClock, Timestamp};
use opsguard_gateway::{Gateway, UpstreamProxy};
use opsguard_health::{ComponentCheck, HealthAggregator, HealthThresholds, HttpCheck};
use opsguard_metrics::{
    MetricStore, MetricsCollector, MetricsProvider, RequestTracker, SysinfoProvider,
};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// External collaborators the core calls out to.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub provider: Arc<dyn MetricsProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub driver: Arc<dyn InstanceDriver>,
    /// Extra checks beyond the HTTP components in the config.
    pub checks: Vec<Arc<dyn ComponentCheck>>,
    /// Defaults to a forecast over the stored request history.
    pub forecast: Option<Arc<dyn LoadForecast>>,
}

impl Collaborators {
    /// Wall clock, host stats from sysinfo, log notifications, and a
    /// logging instance driver.
    pub fn system() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            provider: Arc::new(SysinfoProvider::new()),
            notifier: Arc::new(LogNotifier),
            driver: Arc::new(LocalDriver),
            checks: Vec::new(),
            forecast: None,
        }
    }
}

/// What one maintenance pass removed.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub samples_pruned: usize,
    pub alerts_purged: usize,
    pub history_pruned: usize,
    pub rate_limit_windows_purged: usize,
}

pub struct AppContext {
    pub clock: Arc<dyn Clock>,
    pub store: Arc<MetricStore>,
    pub tracker: Arc<RequestTracker>,
    pub health: Arc<HealthAggregator>,
    pub collector: Arc<MetricsCollector>,
    pub alerts: Arc<AlertEngine>,
    pub scaler: Arc<ScalingController>,
    pub gateway: Arc<Gateway>,
    pub upstream: Option<UpstreamProxy>,
    /// Whether this replica runs the alert and scaling loops.
    pub leader: bool,
    pub started_at: Timestamp,
}

impl AppContext {
    pub fn build(config: &OpsConfig, collab: Collaborators) -> Arc<Self> {
        let clock = collab.clock;
        let store = Arc::new(MetricStore::new(clock.clone()));
        let tracker = RequestTracker::new();

        let mut health =
            HealthAggregator::new(clock.clone(), HealthThresholds::from(&config.health));
        for component in &config.health.components {
            health = health.with_check(Arc::new(HttpCheck::from_config(component)));
        }
        for check in collab.checks {
            health = health.with_check(check);
        }
        let health = Arc::new(health);

        let collector = Arc::new(MetricsCollector::new(
            store.clone(),
            collab.provider,
            tracker.clone(),
            health.clone(),
        ));

        let alerts = Arc::new(AlertEngine::new(
            store.clone(),
            collab.notifier.clone(),
            clock.clone(),
            config.alerts.thresholds.clone(),
            duration_or(&config.alerts.window, Duration::from_secs(300)),
        ));

        let forecast = collab
            .forecast
            .unwrap_or_else(|| Arc::new(HistoryForecast::new(store.clone())));
        let scaler = Arc::new(ScalingController::new(
            &config.autoscaling,
            store.clone(),
            collab.driver,
            collab.notifier,
            forecast,
        ));

        let gateway = Arc::new(Gateway::from_config(&config.gateway, clock.clone()));
        let upstream = config
            .server
            .upstream
            .as_deref()
            .map(|addr| UpstreamProxy::new(addr, UPSTREAM_TIMEOUT));

        let started_at = clock.now_ms();
        Arc::new(Self {
            clock,
            store,
            tracker,
            health,
            collector,
            alerts,
            scaler,
            gateway,
            upstream,
            leader: config.cluster.leader,
            started_at,
        })
    }

    /// Seconds since the context was built.
    pub fn uptime_secs(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.started_at) / 1000
    }

    /// Evict everything past its retention.
    pub async fn maintenance(&self) -> MaintenanceReport {
        let report = MaintenanceReport {
            samples_pruned: self.store.prune(),
            alerts_purged: self.alerts.purge_resolved(),
            history_pruned: self.scaler.prune_history().await,
            rate_limit_windows_purged: self.gateway.limiter().purge_expired(),
        };
        debug!(?report, "maintenance pass complete");
        report
    }

    /// Run the maintenance loop until shutdown.
    pub async fn run_maintenance(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "maintenance loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.maintenance().await;
                }
                _ = shutdown.changed() => {
                    info!("maintenance loop shutting down");
                    break;
                }
            }
        }
    }
}
