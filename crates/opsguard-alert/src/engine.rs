//! Alert engine — opens and resolves threshold alerts.
//!
//! Warning and critical alerts for the same metric have distinct ids and
//! independent lifelines. A metric that jumps straight to critical never
//! opens a warning; a metric that falls from critical into the warning
//! band opens a warning while the critical stays open until the average
//! drops to or below the warning threshold.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use opsguard_core::{Alert, Clock, HOUR_MS, Severity, Thresholds};
use opsguard_metrics::MetricStore;

use crate::notifier::{Notice, NoticeLevel, Notifier, notify_best_effort};

/// Resolved alerts are kept this long before being purged.
const RESOLVED_RETENTION_MS: u64 = HOUR_MS;

pub struct AlertEngine {
    store: Arc<MetricStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    thresholds: BTreeMap<String, Thresholds>,
    window: Duration,
    /// One entry per alert id; the latest lifeline for that id.
    alerts: Mutex<BTreeMap<String, Alert>>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<MetricStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        thresholds: BTreeMap<String, Thresholds>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            thresholds,
            window,
            alerts: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn thresholds(&self) -> &BTreeMap<String, Thresholds> {
        &self.thresholds
    }

    /// Evaluate every monitored metric once.
    ///
    /// Returns the alerts opened by this evaluation. Metrics without
    /// samples in the window are skipped and leave their alerts untouched.
    pub async fn evaluate(&self) -> Vec<Alert> {
        let now = self.clock.now_ms();
        let since = now.saturating_sub(self.window.as_millis() as u64);
        let mut opened = Vec::new();

        {
            let mut alerts = self.alerts.lock().expect("alerts lock");
            for (metric, t) in &self.thresholds {
                let Some(avg) = self.store.average(metric, since) else {
                    debug!(metric = %metric, "no samples in alert window");
                    continue;
                };

                let breach = if avg > t.critical {
                    Some((Severity::Critical, t.critical))
                } else if avg > t.warning {
                    Some((Severity::Warning, t.warning))
                } else {
                    None
                };
                if let Some((severity, threshold)) = breach {
                    opened.extend(open(
                        &mut alerts,
                        metric,
                        severity,
                        avg,
                        threshold,
                        self.window,
                        now,
                    ));
                } else {
                    resolve(&mut alerts, metric, Severity::Warning, avg, now);
                    resolve(&mut alerts, metric, Severity::Critical, avg, now);
                }
            }
        }

        for alert in opened.iter().filter(|a| a.severity == Severity::Critical) {
            let notice = Notice::new(
                NoticeLevel::Critical,
                format!("critical alert: {}", alert.metric),
                alert.message.clone(),
            );
            notify_best_effort(self.notifier.as_ref(), &notice).await;
        }

        opened
    }

    /// Unresolved alerts, newest first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        let alerts = self.alerts.lock().expect("alerts lock");
        let mut active: Vec<Alert> = alerts.values().filter(|a| !a.resolved).cloned().collect();
        active.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        active
    }

    /// Every tracked alert, unresolved first, then newest first.
    pub fn all_alerts(&self) -> Vec<Alert> {
        let alerts = self.alerts.lock().expect("alerts lock");
        let mut all: Vec<Alert> = alerts.values().cloned().collect();
        all.sort_by(|a, b| a.resolved.cmp(&b.resolved).then(b.timestamp.cmp(&a.timestamp)));
        all
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.lock().expect("alerts lock").get(id).cloned()
    }

    /// Drop alerts resolved more than an hour ago; returns how many.
    pub fn purge_resolved(&self) -> usize {
        let cutoff = self.clock.now_ms().saturating_sub(RESOLVED_RETENTION_MS);
        let mut alerts = self.alerts.lock().expect("alerts lock");
        let before = alerts.len();
        alerts.retain(|_, a| !a.resolved || a.timestamp >= cutoff);
        let purged = before - alerts.len();
        if purged > 0 {
            debug!(purged, "stale resolved alerts purged");
        }
        purged
    }

    /// Run the evaluation loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            metrics = self.thresholds.len(),
            "alert engine started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.evaluate().await;
                    self.purge_resolved();
                }
                _ = shutdown.changed() => {
                    info!("alert engine shutting down");
                    break;
                }
            }
        }
    }
}

/// Ensure an unresolved alert exists; returns it only if newly opened.
fn open(
    alerts: &mut BTreeMap<String, Alert>,
    metric: &str,
    severity: Severity,
    avg: f64,
    threshold: f64,
    window: Duration,
    now: u64,
) -> Option<Alert> {
    let id = Alert::id_for(metric, severity);
    if alerts.get(&id).is_some_and(|a| !a.resolved) {
        return None;
    }

    let alert = Alert {
        id: id.clone(),
        metric: metric.to_string(),
        severity,
        message: format!(
            "{metric} averaged {avg:.2} over the last {}s, \
             above the {severity} threshold of {threshold}",
            window.as_secs()
        ),
        timestamp: now,
        resolved: false,
        threshold: Some(threshold),
        current_value: Some(avg),
    };
    match severity {
        Severity::Critical => warn!(%id, value = avg, threshold, "alert opened"),
        Severity::Warning => info!(%id, value = avg, threshold, "alert opened"),
    }
    alerts.insert(id, alert.clone());
    Some(alert)
}

fn resolve(
    alerts: &mut BTreeMap<String, Alert>,
    metric: &str,
    severity: Severity,
    avg: f64,
    now: u64,
) {
    let id = Alert::id_for(metric, severity);
    if let Some(alert) = alerts.get_mut(&id)
        && !alert.resolved
    {
        alert.resolved = true;
        alert.timestamp = now;
        alert.current_value = Some(avg);
        info!(%id, value = avg, "alert resolved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::MemoryNotifier;
    use opsguard_core::{MINUTE_MS, ManualClock, SECOND_MS};

    const T0: u64 = 1_700_000_000_000;

    struct Harness {
        clock: Arc<ManualClock>,
        store: Arc<MetricStore>,
        notifier: Arc<MemoryNotifier>,
        engine: AlertEngine,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MetricStore::new(clock.clone()));
        let notifier = Arc::new(MemoryNotifier::new());
        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            "cpu_usage".to_string(),
            Thresholds { warning: 70.0, critical: 85.0 },
        );
        let engine = AlertEngine::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            thresholds,
            Duration::from_secs(300),
        );
        Harness {
            clock,
            store,
            notifier,
            engine,
        }
    }

    /// Record one sample every 30s for five minutes, ending at the current time.
    fn feed(h: &Harness, value: f64) {
        for _ in 0..10 {
            h.clock.advance(Duration::from_millis(30 * SECOND_MS));
            h.store.record_now("cpu_usage", value);
        }
    }

    #[tokio::test]
    async fn critical_alert_lifecycle() {
        let h = harness();
        feed(&h, 90.0);

        let opened = h.engine.evaluate().await;
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].id, "cpu_usage_critical");

        let active = h.engine.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "cpu_usage_critical");
        assert_eq!(active[0].current_value, Some(90.0));
        assert_eq!(active[0].threshold, Some(85.0));

        feed(&h, 50.0);
        assert!(h.engine.evaluate().await.is_empty());
        assert!(h.engine.active_alerts().is_empty());

        let resolved = h.engine.get("cpu_usage_critical").unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.timestamp, h.clock.now_ms());
    }

    #[tokio::test]
    async fn repeated_evaluation_does_not_duplicate() {
        let h = harness();
        feed(&h, 90.0);
        h.engine.evaluate().await;
        h.clock.advance(Duration::from_millis(MINUTE_MS));
        h.store.record_now("cpu_usage", 90.0);
        assert!(h.engine.evaluate().await.is_empty());

        assert_eq!(h.engine.active_alerts().len(), 1);
        assert_eq!(h.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn critical_alert_notifies_once() {
        let h = harness();
        feed(&h, 95.0);
        h.engine.evaluate().await;

        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Critical);
        assert!(notices[0].message.contains("cpu_usage"));
    }

    #[tokio::test]
    async fn warning_alert_does_not_notify() {
        let h = harness();
        feed(&h, 75.0);
        let opened = h.engine.evaluate().await;

        assert_eq!(opened[0].id, "cpu_usage_warning");
        assert_eq!(opened[0].severity, Severity::Warning);
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn notifier_failure_keeps_alert_state() {
        let h = harness();
        h.notifier.set_failing(true);
        feed(&h, 95.0);

        let opened = h.engine.evaluate().await;
        assert_eq!(opened.len(), 1);
        assert_eq!(h.engine.active_alerts().len(), 1);
    }

    #[tokio::test]
    async fn warning_and_critical_are_independent_lifelines() {
        let h = harness();
        feed(&h, 90.0);
        h.engine.evaluate().await;

        // Falling into the warning band opens a warning; the critical stays open.
        feed(&h, 75.0);
        let opened = h.engine.evaluate().await;
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].id, "cpu_usage_warning");
        assert_eq!(h.engine.active_alerts().len(), 2);

        feed(&h, 40.0);
        h.engine.evaluate().await;
        assert!(h.engine.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn reopened_alert_is_a_new_lifeline() {
        let h = harness();
        feed(&h, 90.0);
        h.engine.evaluate().await;
        feed(&h, 10.0);
        h.engine.evaluate().await;

        feed(&h, 99.0);
        let opened = h.engine.evaluate().await;
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].id, "cpu_usage_critical");
        assert!(!opened[0].resolved);
        assert_eq!(h.notifier.notices().len(), 2);
    }

    #[tokio::test]
    async fn metric_without_samples_is_skipped() {
        let h = harness();
        feed(&h, 90.0);
        h.engine.evaluate().await;

        // Ten minutes of silence: the window is empty, the alert stays open.
        h.clock.advance(Duration::from_millis(10 * MINUTE_MS));
        h.engine.evaluate().await;
        assert_eq!(h.engine.active_alerts().len(), 1);
    }

    #[tokio::test]
    async fn resolved_alerts_are_purged_after_an_hour() {
        let h = harness();
        feed(&h, 90.0);
        h.engine.evaluate().await;
        feed(&h, 10.0);
        h.engine.evaluate().await;
        assert_eq!(h.engine.all_alerts().len(), 1);

        h.clock.advance(Duration::from_millis(30 * MINUTE_MS));
        assert_eq!(h.engine.purge_resolved(), 0);

        h.clock.advance(Duration::from_millis(31 * MINUTE_MS));
        assert_eq!(h.engine.purge_resolved(), 1);
        assert!(h.engine.all_alerts().is_empty());
    }

    #[tokio::test]
    async fn unresolved_alerts_survive_purge() {
        let h = harness();
        feed(&h, 90.0);
        h.engine.evaluate().await;
        h.clock.advance(Duration::from_millis(2 * HOUR_MS));
        assert_eq!(h.engine.purge_resolved(), 0);
        assert_eq!(h.engine.all_alerts().len(), 1);
    }
}
