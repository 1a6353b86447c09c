//! Domain types for the operations-control core.
//!
//! These types cross crate boundaries and the HTTP surface, so all of
//! them serialize with camelCase field names.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix epoch milliseconds.
pub type Timestamp = u64;

pub const SECOND_MS: u64 = 1_000;
pub const MINUTE_MS: u64 = 60 * SECOND_MS;
pub const HOUR_MS: u64 = 60 * MINUTE_MS;
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// Well-known metric names written by the collector.
pub mod names {
    pub const CPU_USAGE: &str = "cpu_usage";
    pub const MEMORY_USAGE: &str = "memory_usage";
    pub const RESPONSE_TIME: &str = "response_time";
    pub const ERROR_RATE: &str = "error_rate";
    pub const REQUEST_COUNT: &str = "request_count";
    pub const ACTIVE_CONNECTIONS: &str = "active_connections";
    pub const HEALTH_SCORE: &str = "health_score";

    pub const ALL: [&str; 7] = [
        CPU_USAGE,
        MEMORY_USAGE,
        RESPONSE_TIME,
        ERROR_RATE,
        REQUEST_COUNT,
        ACTIVE_CONNECTIONS,
        HEALTH_SCORE,
    ];
}

// ── Metrics ────────────────────────────────────────────────────────

/// One observation of a named numeric series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub timestamp: Timestamp,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

// ── Alerts ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning/critical boundaries for one monitored metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// `{metric}_{severity}`; see [`Alert::id_for`].
    pub id: String,
    pub metric: String,
    pub severity: Severity,
    pub message: String,
    /// Creation time, replaced by the resolution time once resolved.
    pub timestamp: Timestamp,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
}

impl Alert {
    pub fn id_for(metric: &str, severity: Severity) -> String {
        format!("{metric}_{severity}")
    }
}

// ── Scaling ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDirection {
    ScaleUp,
    ScaleDown,
}

impl ScalingDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScalingDirection::ScaleUp => "scale_up",
            ScalingDirection::ScaleDown => "scale_down",
        }
    }
}

impl fmt::Display for ScalingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threshold rule evaluated by the scaling control loop.
///
/// Field aliases let TOML config use snake_case keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingRule {
    pub metric: String,
    pub threshold: f64,
    pub action: ScalingDirection,
    #[serde(alias = "cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(alias = "min_instances")]
    pub min_instances: u32,
    #[serde(alias = "max_instances")]
    pub max_instances: u32,
}

/// Record of one attempted scaling operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingAction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ScalingDirection,
    pub reason: String,
    pub timestamp: Timestamp,
    pub instances_before: u32,
    pub instances_after: u32,
    pub success: bool,
}

/// Non-binding advice returned by the controller's advisory queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingRecommendation {
    pub action: ScalingDirection,
    pub target_instances: u32,
    pub reason: String,
}

// ── Health ─────────────────────────────────────────────────────────

/// Latest aggregate view of the host and request path.
///
/// Readings are `None` while unknown (never collected, or the last
/// collection failed).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub active_connections: u64,
    pub response_time_ms: Option<f64>,
    pub last_check: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl ComponentStatus {
    /// Whether this status counts against overall health.
    pub fn is_issue(self) -> bool {
        matches!(self, ComponentStatus::Degraded | ComponentStatus::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub status: ComponentStatus,
    pub last_check: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallHealth {
    /// Classify by number of outstanding issues.
    pub fn from_issue_count(issues: usize) -> Self {
        match issues {
            0 => OverallHealth::Healthy,
            1..=2 => OverallHealth::Degraded,
            _ => OverallHealth::Unhealthy,
        }
    }
}

// ── Gateway ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Open => "open",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub last_failure_time: Option<Timestamp>,
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterEntry {
    pub client_id: String,
    pub count: u32,
    pub window_reset_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_id_combines_metric_and_severity() {
        assert_eq!(Alert::id_for("cpu_usage", Severity::Critical), "cpu_usage_critical");
        assert_eq!(Alert::id_for("error_rate", Severity::Warning), "error_rate_warning");
    }

    #[test]
    fn overall_health_buckets() {
        assert_eq!(OverallHealth::from_issue_count(0), OverallHealth::Healthy);
        assert_eq!(OverallHealth::from_issue_count(1), OverallHealth::Degraded);
        assert_eq!(OverallHealth::from_issue_count(2), OverallHealth::Degraded);
        assert_eq!(OverallHealth::from_issue_count(3), OverallHealth::Unhealthy);
    }

    #[test]
    fn scaling_action_uses_type_key() {
        let action = ScalingAction {
            id: "scale_up-1".to_string(),
            kind: ScalingDirection::ScaleUp,
            reason: "manual".to_string(),
            timestamp: 1,
            instances_before: 2,
            instances_after: 5,
            success: true,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "scale_up");
        assert_eq!(json["instancesBefore"], 2);
        assert_eq!(json["instancesAfter"], 5);
    }

    #[test]
    fn scaling_rule_accepts_snake_case_keys() {
        let rule: ScalingRule = serde_json::from_str(
            r#"{"metric":"cpu_usage","threshold":75,"action":"scale_up",
                "cooldown_seconds":300,"min_instances":1,"max_instances":10}"#,
        )
        .unwrap();
        assert_eq!(rule.cooldown_seconds, 300);
        assert_eq!(rule.action, ScalingDirection::ScaleUp);
    }
}
