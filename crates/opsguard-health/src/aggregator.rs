//! Health aggregator — folds component and server health into one status.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use opsguard_core::config::HealthConfig;
use opsguard_core::{Clock, ComponentHealth, ComponentStatus, OverallHealth, ServerHealth};

use crate::checker::ComponentCheck;

/// Server readings above these values count as issues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub response_time_ms: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            cpu_usage: 80.0,
            memory_usage: 85.0,
            response_time_ms: 1000.0,
        }
    }
}

impl From<&HealthConfig> for HealthThresholds {
    fn from(config: &HealthConfig) -> Self {
        Self {
            cpu_usage: config.cpu_threshold,
            memory_usage: config.memory_threshold,
            response_time_ms: config.response_time_threshold_ms,
        }
    }
}

/// Keeps the latest component and server health and classifies it.
pub struct HealthAggregator {
    clock: Arc<dyn Clock>,
    thresholds: HealthThresholds,
    checks: Vec<Arc<dyn ComponentCheck>>,
    components: RwLock<BTreeMap<String, ComponentHealth>>,
    server: RwLock<ServerHealth>,
}

impl HealthAggregator {
    pub fn new(clock: Arc<dyn Clock>, thresholds: HealthThresholds) -> Self {
        Self {
            clock,
            thresholds,
            checks: Vec::new(),
            components: RwLock::new(BTreeMap::new()),
            server: RwLock::new(ServerHealth::default()),
        }
    }

    /// Register a polled component check.
    pub fn with_check(mut self, check: Arc<dyn ComponentCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Poll every registered check once.
    ///
    /// A check that errors is recorded as `unknown` for this round.
    pub async fn refresh(&self) -> Vec<ComponentHealth> {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let (status, detail) = match check.check().await {
                Ok(status) => (status, None),
                Err(e) => {
                    warn!(component = check.name(), error = %e, "health check failed");
                    (ComponentStatus::Unknown, Some(e.to_string()))
                }
            };
            results.push(self.report(check.name(), status, detail));
        }
        debug!(components = results.len(), "component health refreshed");
        results
    }

    /// Record a status pushed by a collaborator.
    pub fn report(
        &self,
        name: &str,
        status: ComponentStatus,
        detail: Option<String>,
    ) -> ComponentHealth {
        let entry = ComponentHealth {
            name: name.to_string(),
            status,
            last_check: self.clock.now_ms(),
            detail,
        };
        let mut components = self.components.write().expect("components lock");
        if let Some(prev) = components.insert(name.to_string(), entry.clone())
            && prev.status != status
        {
            info!(component = name, from = ?prev.status, to = ?status, "component status changed");
        }
        entry
    }

    pub fn components(&self) -> Vec<ComponentHealth> {
        let components = self.components.read().expect("components lock");
        components.values().cloned().collect()
    }

    pub fn update_server(&self, snapshot: ServerHealth) {
        *self.server.write().expect("server health lock") = snapshot;
    }

    pub fn server(&self) -> ServerHealth {
        self.server.read().expect("server health lock").clone()
    }

    /// Human-readable list of everything currently counting against health.
    pub fn issues(&self) -> Vec<String> {
        let mut issues: Vec<String> = self
            .components()
            .into_iter()
            .filter(|c| c.status.is_issue())
            .map(|c| format!("{} is {:?}", c.name, c.status).to_lowercase())
            .collect();

        let server = self.server();
        let t = &self.thresholds;
        if let Some(cpu) = server.cpu_usage
            && cpu > t.cpu_usage
        {
            issues.push(format!("cpu usage {cpu:.1}% above {}%", t.cpu_usage));
        }
        if let Some(mem) = server.memory_usage
            && mem > t.memory_usage
        {
            issues.push(format!("memory usage {mem:.1}% above {}%", t.memory_usage));
        }
        if let Some(rt) = server.response_time_ms
            && rt > t.response_time_ms
        {
            issues.push(format!("response time {rt:.0}ms above {}ms", t.response_time_ms));
        }
        issues
    }

    pub fn overall_health(&self) -> OverallHealth {
        OverallHealth::from_issue_count(self.issues().len())
    }

    /// Run the component polling loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            checks = self.checks.len(),
            "health aggregator started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.refresh().await;
                }
                _ = shutdown.changed() => {
                    info!("health aggregator shutting down");
                    break;
                }
            }
        }
    }
}
