//! ScalingController — evaluates scaling rules and drives the instance count.
//!
//! All mutable state sits behind one async mutex that is held across the
//! driver call, so an evaluation tick, a manual scale, and an emergency
//! scale never interleave.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use opsguard_alert::{Notice, NoticeLevel, Notifier, notify_best_effort};
use opsguard_core::config::AutoscalingConfig;
use opsguard_core::{
    Clock, DAY_MS, ScalingAction, ScalingDirection, ScalingRecommendation, ScalingRule, Timestamp,
};
use opsguard_metrics::MetricStore;

use crate::driver::InstanceDriver;
use crate::error::ScaleError;
use crate::forecast::LoadForecast;

/// History is capped at this many actions.
const HISTORY_CAP: usize = 100;
/// Actions shown in the status report.
const RECENT_HISTORY: usize = 10;
/// Projected load above this multiple of the baseline triggers a
/// predictive recommendation.
const PREDICTIVE_FACTOR: f64 = 1.5;
/// Instances added by a predictive recommendation.
const PREDICTIVE_STEP: u32 = 2;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingStatus {
    pub enabled: bool,
    pub current_instances: u32,
    pub last_scaling_action: Option<Timestamp>,
    pub scaling_rules: Vec<ScalingRule>,
    pub recent_history: Vec<ScalingAction>,
    pub recommendations: Vec<ScalingRecommendation>,
}

/// Aggregates over the last 24 hours of scaling history.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingMetrics {
    pub total_actions: usize,
    pub scale_ups: usize,
    pub scale_downs: usize,
    pub successful: usize,
    pub failed: usize,
    pub min_instances: u32,
    pub max_instances: u32,
    pub avg_instances: f64,
}

struct ControllerState {
    enabled: bool,
    current_instances: u32,
    last_scaling_action: Option<Timestamp>,
    /// Keyed by rule index; cleared when the rules are replaced.
    rule_cooldowns: HashMap<usize, Timestamp>,
    rules: Vec<ScalingRule>,
    history: VecDeque<ScalingAction>,
    seq: u64,
}

impl ControllerState {
    fn stamp_all_rules(&mut self, now: Timestamp) {
        for idx in 0..self.rules.len() {
            self.rule_cooldowns.insert(idx, now);
        }
    }
}

pub struct ScalingController {
    store: Arc<MetricStore>,
    driver: Arc<dyn InstanceDriver>,
    notifier: Arc<dyn Notifier>,
    forecast: Arc<dyn LoadForecast>,
    clock: Arc<dyn Clock>,
    min_instances: u32,
    max_instances: u32,
    state: Mutex<ControllerState>,
}

impl ScalingController {
    pub fn new(
        config: &AutoscalingConfig,
        store: Arc<MetricStore>,
        driver: Arc<dyn InstanceDriver>,
        notifier: Arc<dyn Notifier>,
        forecast: Arc<dyn LoadForecast>,
    ) -> Self {
        let clock = store.clock().clone();
        let current = config
            .initial_instances
            .clamp(config.min_instances, config.max_instances);
        Self {
            store,
            driver,
            notifier,
            forecast,
            clock,
            min_instances: config.min_instances,
            max_instances: config.max_instances,
            state: Mutex::new(ControllerState {
                enabled: config.enabled,
                current_instances: current,
                last_scaling_action: None,
                rule_cooldowns: HashMap::new(),
                rules: config.rules.clone(),
                history: VecDeque::new(),
                seq: 0,
            }),
        }
    }

    pub fn bounds(&self) -> (u32, u32) {
        (self.min_instances, self.max_instances)
    }

    pub async fn current_instances(&self) -> u32 {
        self.state.lock().await.current_instances
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    pub async fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        if state.enabled != enabled {
            info!(enabled, "autoscaling toggled");
        }
        state.enabled = enabled;
    }

    pub async fn rules(&self) -> Vec<ScalingRule> {
        self.state.lock().await.rules.clone()
    }

    /// Replace the rule set. Per-rule cooldowns start over.
    pub async fn set_rules(&self, rules: Vec<ScalingRule>) {
        let mut state = self.state.lock().await;
        info!(rules = rules.len(), "scaling rules replaced");
        state.rules = rules;
        state.rule_cooldowns.clear();
    }

    /// Run one evaluation of the rule set.
    ///
    /// Returns the executed action, if any. Does nothing while disabled.
    pub async fn evaluate(&self) -> Option<ScalingAction> {
        let mut state = self.state.lock().await;
        if !state.enabled {
            return None;
        }
        let now = self.clock.now_ms();

        let mut chosen = None;
        for (idx, rule) in state.rules.iter().enumerate() {
            let Some(sample) = self.store.latest(&rule.metric) else {
                continue;
            };
            let value = sample.value;
            let fires = match rule.action {
                ScalingDirection::ScaleUp => value > rule.threshold,
                ScalingDirection::ScaleDown => value < rule.threshold,
            };
            if !fires {
                continue;
            }

            if let Some(&last) = state.rule_cooldowns.get(&idx)
                && now.saturating_sub(last) < rule.cooldown_seconds.saturating_mul(1000)
            {
                debug!(metric = %rule.metric, action = %rule.action, "rule in cooldown");
                continue;
            }

            let current = state.current_instances;
            let target = match rule.action {
                ScalingDirection::ScaleUp => current.checked_add(1),
                ScalingDirection::ScaleDown => current.checked_sub(1),
            };
            let lo = rule.min_instances.max(self.min_instances);
            let hi = rule.max_instances.min(self.max_instances);
            let Some(target) = target.filter(|t| (lo..=hi).contains(t)) else {
                debug!(metric = %rule.metric, current, lo, hi, "rule target out of bounds");
                continue;
            };

            let reason = format!(
                "{} {:.2} {} threshold {}",
                rule.metric,
                value,
                if rule.action == ScalingDirection::ScaleUp { "above" } else { "below" },
                rule.threshold
            );
            chosen = Some((idx, rule.action, target, reason));
            break;
        }

        let (idx, direction, target, reason) = chosen?;
        let action = self.execute(&mut state, direction, target, reason, now).await;
        if action.success {
            state.rule_cooldowns.insert(idx, now);
        }
        drop(state);

        self.announce(&action).await;
        Some(action)
    }

    /// Scale to exactly `target`, bypassing the rules.
    ///
    /// A target equal to the current count skips the driver and records a
    /// successful `n -> n` action.
    pub async fn manual_scale(
        &self,
        target: i64,
        reason: &str,
    ) -> Result<ScalingAction, ScaleError> {
        let Some(target) = u32::try_from(target)
            .ok()
            .filter(|t| (self.min_instances..=self.max_instances).contains(t))
        else {
            return Err(ScaleError::OutOfBounds {
                target,
                min: self.min_instances,
                max: self.max_instances,
            });
        };

        let mut state = self.state.lock().await;
        let current = state.current_instances;
        let direction = if target >= current {
            ScalingDirection::ScaleUp
        } else {
            ScalingDirection::ScaleDown
        };
        let reason = format!("manual: {reason}");

        let now = self.clock.now_ms();
        let action = if target == current {
            debug!(target, "manual scale to the current count");
            let action =
                self.record_action(&mut state, direction, current, current, reason, true, now);
            state.last_scaling_action = Some(now);
            action
        } else {
            self.execute(&mut state, direction, target, reason, now).await
        };
        if action.success {
            state.stamp_all_rules(now);
        }
        drop(state);

        self.announce(&action).await;
        Ok(action)
    }

    pub async fn emergency_scale(&self, reason: &str) -> ScalingAction {
        let mut state = self.state.lock().await;
        let now = self.clock.now_ms();
        let reason = format!("emergency: {reason}");
        warn!(%reason, max = self.max_instances, "emergency scale requested");

        let action = if state.current_instances == self.max_instances {
            let action = self.record_action(
                &mut state,
                ScalingDirection::ScaleUp,
                self.max_instances,
                self.max_instances,
                reason,
                true,
                now,
            );
            state.last_scaling_action = Some(now);
            action
        } else {
            self.execute(&mut state, ScalingDirection::ScaleUp, self.max_instances, reason, now)
                .await
        };
        if action.success {
            state.stamp_all_rules(now);
        }
        drop(state);

        let level = if action.success {
            NoticeLevel::Emergency
        } else {
            NoticeLevel::Critical
        };
        let notice = Notice::new(
            level,
            "emergency scale",
            format!(
                "{}: {} -> {} instances ({})",
                action.reason,
                action.instances_before,
                action.instances_after,
                if action.success { "ok" } else { "failed" }
            ),
        );
        notify_best_effort(self.notifier.as_ref(), &notice).await;
        action
    }

    /// Non-binding scale-up advice when the forecast for the next two
    /// hours exceeds 1.5x the baseline. Never executes anything.
    pub async fn predictive_scaling(&self) -> Option<ScalingRecommendation> {
        let baseline = self.forecast.baseline().filter(|b| *b > 0.0)?;
        let projected = [1, 2]
            .into_iter()
            .filter_map(|h| self.forecast.projected(h))
            .reduce(f64::max)?;
        if projected <= baseline * PREDICTIVE_FACTOR {
            return None;
        }

        let current = self.current_instances().await;
        let target = current.saturating_add(PREDICTIVE_STEP).min(self.max_instances);
        if target <= current {
            return None;
        }
        Some(ScalingRecommendation {
            action: ScalingDirection::ScaleUp,
            target_instances: target,
            reason: format!(
                "projected load {projected:.1} exceeds {PREDICTIVE_FACTOR}x baseline {baseline:.1}"
            ),
        })
    }

    /// Predictive advice plus an at-capacity warning when a scale-up rule
    /// fires but the maximum is already reached.
    pub async fn recommendations(&self) -> Vec<ScalingRecommendation> {
        let mut out: Vec<ScalingRecommendation> =
            self.predictive_scaling().await.into_iter().collect();

        let (current, rules) = {
            let state = self.state.lock().await;
            (state.current_instances, state.rules.clone())
        };
        if current >= self.max_instances {
            let pressured = rules.iter().find_map(|rule| {
                if rule.action != ScalingDirection::ScaleUp {
                    return None;
                }
                let value = self.store.latest(&rule.metric)?.value;
                (value > rule.threshold).then(|| (rule, value))
            });
            if let Some((rule, value)) = pressured {
                out.push(ScalingRecommendation {
                    action: ScalingDirection::ScaleUp,
                    target_instances: self.max_instances,
                    reason: format!(
                        "at maximum capacity ({} instances) while {} is {value:.2}, above {}",
                        self.max_instances, rule.metric, rule.threshold
                    ),
                });
            }
        }
        out
    }

    pub async fn status(&self) -> AutoscalingStatus {
        let recommendations = self.recommendations().await;
        let state = self.state.lock().await;
        AutoscalingStatus {
            enabled: state.enabled,
            current_instances: state.current_instances,
            last_scaling_action: state.last_scaling_action,
            scaling_rules: state.rules.clone(),
            recent_history: state
                .history
                .iter()
                .rev()
                .take(RECENT_HISTORY)
                .cloned()
                .collect(),
            recommendations,
        }
    }

    /// Full history, oldest first.
    pub async fn history(&self) -> Vec<ScalingAction> {
        self.state.lock().await.history.iter().cloned().collect()
    }

    pub async fn scaling_metrics(&self) -> ScalingMetrics {
        let cutoff = self.clock.now_ms().saturating_sub(DAY_MS);
        let state = self.state.lock().await;
        let recent: Vec<&ScalingAction> = state
            .history
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .collect();

        let scale_ups = recent
            .iter()
            .filter(|a| a.kind == ScalingDirection::ScaleUp)
            .count();
        let successful = recent.iter().filter(|a| a.success).count();

        let current = state.current_instances;
        let (min, max, avg) = if recent.is_empty() {
            (current, current, f64::from(current))
        } else {
            let after = recent.iter().map(|a| a.instances_after);
            let total: u64 = after.clone().map(u64::from).sum();
            (
                after.clone().min().unwrap_or(current),
                after.max().unwrap_or(current),
                total as f64 / recent.len() as f64,
            )
        };

        ScalingMetrics {
            total_actions: recent.len(),
            scale_ups,
            scale_downs: recent.len() - scale_ups,
            successful,
            failed: recent.len() - successful,
            min_instances: min,
            max_instances: max,
            avg_instances: avg,
        }
    }

    /// Drop history older than 24h; returns how many were removed.
    pub async fn prune_history(&self) -> usize {
        let cutoff = self.clock.now_ms().saturating_sub(DAY_MS);
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.retain(|a| a.timestamp >= cutoff);
        before - state.history.len()
    }

    /// Run the control loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            min = self.min_instances,
            max = self.max_instances,
            "scaling controller started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.evaluate().await;
                }
                _ = shutdown.changed() => {
                    info!("scaling controller shutting down");
                    break;
                }
            }
        }
    }

    async fn execute(
        &self,
        state: &mut ControllerState,
        direction: ScalingDirection,
        target: u32,
        reason: String,
        now: Timestamp,
    ) -> ScalingAction {
        let before = state.current_instances;
        match self.driver.scale_to(before, target).await {
            Ok(()) => {
                state.current_instances = target;
                state.last_scaling_action = Some(now);
                info!(%direction, from = before, to = target, %reason, "scaled");
                self.record_action(state, direction, before, target, reason, true, now)
            }
            Err(e) => {
                warn!(%direction, from = before, to = target, error = %e, "scaling failed");
                let reason = format!("{reason}: {e}");
                self.record_action(state, direction, before, before, reason, false, now)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_action(
        &self,
        state: &mut ControllerState,
        kind: ScalingDirection,
        before: u32,
        after: u32,
        reason: String,
        success: bool,
        now: Timestamp,
    ) -> ScalingAction {
        state.seq += 1;
        let action = ScalingAction {
            id: format!("scale_{now}_{}", state.seq),
            kind,
            reason,
            timestamp: now,
            instances_before: before,
            instances_after: after,
            success,
        };
        state.history.push_back(action.clone());
        while state.history.len() > HISTORY_CAP {
            state.history.pop_front();
        }
        action
    }

    async fn announce(&self, action: &ScalingAction) {
        let (level, title) = if action.success {
            (NoticeLevel::Info, format!("{} executed", action.kind))
        } else {
            (NoticeLevel::Critical, format!("{} failed", action.kind))
        };
        let message = format!(
            "{} -> {} instances: {}",
            action.instances_before, action.instances_after, action.reason
        );
        notify_best_effort(self.notifier.as_ref(), &Notice::new(level, title, message)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use opsguard_alert::MemoryNotifier;
    use opsguard_core::{BoxFuture, ManualClock, SECOND_MS, names};

    use crate::forecast::StaticForecast;

    const T0: u64 = 1_700_000_000_000;

    struct FlakyDriver {
        failing: AtomicBool,
    }

    impl InstanceDriver for FlakyDriver {
        fn scale_to(&self, _from: u32, _to: u32) -> BoxFuture<'_, anyhow::Result<()>> {
            let failing = self.failing.load(Ordering::SeqCst);
            Box::pin(async move {
                if failing {
                    anyhow::bail!("instance start refused");
                }
                Ok(())
            })
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        store: Arc<MetricStore>,
        driver: Arc<FlakyDriver>,
        notifier: Arc<MemoryNotifier>,
        controller: ScalingController,
    }

    fn rule(metric: &str, threshold: f64, action: ScalingDirection, cooldown: u64) -> ScalingRule {
        ScalingRule {
            metric: metric.to_string(),
            threshold,
            action,
            cooldown_seconds: cooldown,
            min_instances: 1,
            max_instances: 10,
        }
    }

    fn harness_with(rules: Vec<ScalingRule>, initial: u32, forecast: StaticForecast) -> Harness {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(MetricStore::new(clock.clone()));
        let driver = Arc::new(FlakyDriver {
            failing: AtomicBool::new(false),
        });
        let notifier = Arc::new(MemoryNotifier::new());
        let config = AutoscalingConfig {
            initial_instances: initial,
            rules,
            ..AutoscalingConfig::default()
        };
        let controller = ScalingController::new(
            &config,
            store.clone(),
            driver.clone(),
            notifier.clone(),
            Arc::new(forecast),
        );
        Harness {
            clock,
            store,
            driver,
            notifier,
            controller,
        }
    }

    fn harness(rules: Vec<ScalingRule>, initial: u32) -> Harness {
        harness_with(rules, initial, StaticForecast::empty())
    }

    fn advance_secs(h: &Harness, secs: u64) {
        h.clock.advance(Duration::from_millis(secs * SECOND_MS));
    }

    #[tokio::test]
    async fn rule_cooldown_blocks_repeat_until_elapsed() {
        let h = harness(vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 300)], 1);

        h.store.record_now(names::CPU_USAGE, 90.0);
        let first = h.controller.evaluate().await.unwrap();
        assert_eq!(first.kind, ScalingDirection::ScaleUp);
        assert_eq!((first.instances_before, first.instances_after), (1, 2));

        advance_secs(&h, 100);
        h.store.record_now(names::CPU_USAGE, 90.0);
        assert!(h.controller.evaluate().await.is_none());
        assert_eq!(h.controller.current_instances().await, 2);

        advance_secs(&h, 201);
        h.store.record_now(names::CPU_USAGE, 90.0);
        let second = h.controller.evaluate().await.unwrap();
        assert_eq!((second.instances_before, second.instances_after), (2, 3));
    }

    #[tokio::test]
    async fn cooldowns_are_per_rule() {
        let h = harness(
            vec![
                rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 300),
                rule(names::MEMORY_USAGE, 30.0, ScalingDirection::ScaleDown, 600),
            ],
            3,
        );

        h.store.record_now(names::CPU_USAGE, 90.0);
        h.controller.evaluate().await.unwrap();
        assert_eq!(h.controller.current_instances().await, 4);

        // The scale-up did not consume the scale-down rule's cooldown.
        advance_secs(&h, 10);
        h.store.record_now(names::CPU_USAGE, 50.0);
        h.store.record_now(names::MEMORY_USAGE, 10.0);
        let down = h.controller.evaluate().await.unwrap();
        assert_eq!(down.kind, ScalingDirection::ScaleDown);
        assert_eq!(h.controller.current_instances().await, 3);
    }

    #[tokio::test]
    async fn one_action_per_tick() {
        let h = harness(
            vec![
                rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 0),
                rule(names::MEMORY_USAGE, 80.0, ScalingDirection::ScaleUp, 0),
            ],
            1,
        );
        h.store.record_now(names::CPU_USAGE, 90.0);
        h.store.record_now(names::MEMORY_USAGE, 90.0);

        h.controller.evaluate().await.unwrap();
        assert_eq!(h.controller.current_instances().await, 2);
        assert_eq!(h.controller.history().await.len(), 1);
    }

    #[tokio::test]
    async fn rule_bounds_are_respected() {
        let mut tight = rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 0);
        tight.max_instances = 3;
        let h = harness(vec![tight], 3);

        h.store.record_now(names::CPU_USAGE, 99.0);
        assert!(h.controller.evaluate().await.is_none());

        let h = harness(vec![rule(names::CPU_USAGE, 25.0, ScalingDirection::ScaleDown, 0)], 1);
        h.store.record_now(names::CPU_USAGE, 5.0);
        assert!(h.controller.evaluate().await.is_none());
    }

    #[tokio::test]
    async fn disabled_controller_does_nothing() {
        let h = harness(vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 0)], 1);
        h.controller.set_enabled(false).await;
        h.store.record_now(names::CPU_USAGE, 90.0);
        assert!(h.controller.evaluate().await.is_none());

        h.controller.set_enabled(true).await;
        assert!(h.controller.evaluate().await.is_some());
    }

    #[tokio::test]
    async fn missing_metric_is_skipped() {
        let h = harness(vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 0)], 1);
        assert!(h.controller.evaluate().await.is_none());
    }

    #[tokio::test]
    async fn manual_scale_validates_bounds() {
        let h = harness(vec![], 2);
        assert_eq!(
            h.controller.manual_scale(0, "x").await,
            Err(ScaleError::OutOfBounds { target: 0, min: 1, max: 10 })
        );
        assert!(h.controller.manual_scale(11, "x").await.is_err());

        assert_eq!(
            h.controller.manual_scale(-1, "x").await,
            Err(ScaleError::OutOfBounds { target: -1, min: 1, max: 10 })
        );

        let action = h.controller.manual_scale(5, "x").await.unwrap();
        assert_eq!(action.instances_before, 2);
        assert_eq!(action.instances_after, 5);
        assert_eq!(action.kind, ScalingDirection::ScaleUp);
        assert!(action.success);
        assert_eq!(h.controller.current_instances().await, 5);
        assert_eq!(h.controller.history().await.len(), 1);

    }

    #[tokio::test]
    async fn manual_scale_to_current_count_is_recorded() {
        let h = harness(vec![], 1);
        let action = h.controller.manual_scale(1, "pin").await.unwrap();
        assert!(action.success);
        assert_eq!((action.instances_before, action.instances_after), (1, 1));
        assert_eq!(h.controller.current_instances().await, 1);

        let history = h.controller.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, "manual: pin");
    }

    #[tokio::test]
    async fn history_is_capped() {
        let h = harness(vec![], 1);
        for i in 0..150 {
            h.controller.manual_scale(if i % 2 == 0 { 2 } else { 1 }, "flap").await.unwrap();
        }
        let history = h.controller.history().await;
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].id, format!("scale_{T0}_51"));
        assert_eq!(history[HISTORY_CAP - 1].id, format!("scale_{T0}_150"));
    }

    #[tokio::test]
    async fn huge_cooldown_does_not_overflow() {
        let rules = vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, u64::MAX)];
        let h = harness(rules, 1);
        h.store.record_now(names::CPU_USAGE, 90.0);
        assert!(h.controller.evaluate().await.is_some());

        advance_secs(&h, 3600);
        h.store.record_now(names::CPU_USAGE, 90.0);
        assert!(h.controller.evaluate().await.is_none());
    }

    #[tokio::test]
    async fn manual_scale_restarts_rule_cooldowns() {
        let h = harness(vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 300)], 2);
        h.controller.manual_scale(4, "deploy").await.unwrap();

        advance_secs(&h, 60);
        h.store.record_now(names::CPU_USAGE, 90.0);
        assert!(h.controller.evaluate().await.is_none());
    }

    #[tokio::test]
    async fn emergency_scale_ignores_cooldown() {
        let h = harness(vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 300)], 1);
        h.store.record_now(names::CPU_USAGE, 90.0);
        h.controller.evaluate().await.unwrap();

        let action = h.controller.emergency_scale("outage").await;
        assert!(action.success);
        assert_eq!(action.instances_after, 10);
        assert_eq!(h.controller.current_instances().await, 10);

        let notices = h.notifier.notices();
        assert_eq!(notices.last().unwrap().level, NoticeLevel::Emergency);
    }

    #[tokio::test]
    async fn emergency_scale_at_max_still_records() {
        let h = harness(vec![], 10);
        let action = h.controller.emergency_scale("outage").await;
        assert!(action.success);
        assert_eq!((action.instances_before, action.instances_after), (10, 10));
        assert_eq!(h.controller.history().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_execution_keeps_instance_count() {
        let h = harness(vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 300)], 2);
        h.driver.failing.store(true, Ordering::SeqCst);
        h.store.record_now(names::CPU_USAGE, 90.0);

        let action = h.controller.evaluate().await.unwrap();
        assert!(!action.success);
        assert!(action.reason.contains("instance start refused"));
        assert_eq!(action.instances_after, 2);
        assert_eq!(h.controller.current_instances().await, 2);
        assert_eq!(h.notifier.notices().last().unwrap().level, NoticeLevel::Critical);

        // A failure does not start the cooldown.
        h.driver.failing.store(false, Ordering::SeqCst);
        advance_secs(&h, 30);
        h.store.record_now(names::CPU_USAGE, 90.0);
        assert!(h.controller.evaluate().await.unwrap().success);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_roll_back() {
        let h = harness(vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 0)], 1);
        h.notifier.set_failing(true);
        h.store.record_now(names::CPU_USAGE, 90.0);
        assert!(h.controller.evaluate().await.unwrap().success);
        assert_eq!(h.controller.current_instances().await, 2);
    }

    #[tokio::test]
    async fn predictive_scaling_recommends_without_executing() {
        let h = harness_with(vec![], 3, StaticForecast::new(100.0, vec![120.0, 180.0]));
        let rec = h.controller.predictive_scaling().await.unwrap();
        assert_eq!(rec.action, ScalingDirection::ScaleUp);
        assert_eq!(rec.target_instances, 5);
        assert_eq!(h.controller.current_instances().await, 3);
        assert!(h.controller.history().await.is_empty());

        let calm = harness_with(vec![], 3, StaticForecast::new(100.0, vec![120.0, 140.0]));
        assert!(calm.controller.predictive_scaling().await.is_none());

        let capped = harness_with(vec![], 9, StaticForecast::new(100.0, vec![300.0]));
        assert_eq!(capped.controller.predictive_scaling().await.unwrap().target_instances, 10);
    }

    #[tokio::test]
    async fn recommendations_include_capacity_warning() {
        let h = harness(vec![rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 0)], 10);
        h.store.record_now(names::CPU_USAGE, 95.0);
        let recs = h.controller.recommendations().await;
        assert_eq!(recs.len(), 1);
        assert!(recs[0].reason.contains("maximum capacity"));
    }

    #[tokio::test]
    async fn scaling_metrics_summarise_last_day() {
        let h = harness(vec![], 2);
        assert_eq!(h.controller.scaling_metrics().await.total_actions, 0);
        assert_eq!(h.controller.scaling_metrics().await.avg_instances, 2.0);

        h.controller.manual_scale(6, "a").await.unwrap();
        h.controller.manual_scale(4, "b").await.unwrap();
        h.driver.failing.store(true, Ordering::SeqCst);
        h.controller.manual_scale(8, "c").await.unwrap();

        let m = h.controller.scaling_metrics().await;
        assert_eq!(m.total_actions, 3);
        assert_eq!(m.scale_ups, 2);
        assert_eq!(m.scale_downs, 1);
        assert_eq!(m.successful, 2);
        assert_eq!(m.failed, 1);
        assert_eq!(m.min_instances, 4);
        assert_eq!(m.max_instances, 6);
        assert!((m.avg_instances - 14.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn history_is_pruned_after_a_day() {
        let h = harness(vec![], 2);
        h.controller.manual_scale(3, "a").await.unwrap();
        h.clock.advance(Duration::from_millis(DAY_MS + 1));
        h.controller.manual_scale(4, "b").await.unwrap();

        assert_eq!(h.controller.prune_history().await, 1);
        assert_eq!(h.controller.history().await.len(), 1);
    }

    #[tokio::test]
    async fn status_reports_recent_history_newest_first() {
        let h = harness(vec![], 1);
        for target in 2..=5 {
            h.controller.manual_scale(target, "step").await.unwrap();
        }
        let status = h.controller.status().await;
        assert_eq!(status.current_instances, 5);
        assert_eq!(status.recent_history.len(), 4);
        assert_eq!(status.recent_history[0].instances_after, 5);
        assert_eq!(status.last_scaling_action, Some(T0));
    }
}
