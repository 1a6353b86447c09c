//! opsguard.toml configuration parser.
//!
//! Every section and field has a default, so an empty file (or no file
//! at all) yields a runnable configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ScalingDirection, ScalingRule, Thresholds, names};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub metrics: MetricsConfig,
    pub alerts: AlertsConfig,
    pub autoscaling: AutoscalingConfig,
    pub gateway: GatewayConfig,
    pub health: HealthConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// `host:port` of the protected application, if proxied.
    pub upstream: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Only the leader runs the alert and scaling loops.
    pub leader: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub collect_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub evaluate_interval: String,
    /// Trailing window averaged for each evaluation.
    pub window: String,
    pub thresholds: BTreeMap<String, Thresholds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalingConfig {
    pub enabled: bool,
    pub evaluate_interval: String,
    pub initial_instances: u32,
    pub min_instances: u32,
    pub max_instances: u32,
    pub rules: Vec<ScalingRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub failure_threshold: u32,
    pub open_timeout: String,
    pub max_requests: u32,
    pub window: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval: String,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub response_time_threshold_ms: f64,
    pub components: Vec<HttpComponentConfig>,
}

/// An HTTP-probed downstream collaborator (database sidecar, cache, CDN).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpComponentConfig {
    pub name: String,
    /// `host:port` to probe.
    pub address: String,
    #[serde(default = "default_probe_path")]
    pub path: String,
    #[serde(default = "default_probe_timeout")]
    pub timeout: String,
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub cleanup_interval: String,
}

fn default_probe_path() -> String {
    "/health".to_string()
}

fn default_probe_timeout() -> String {
    "2s".to_string()
}

fn default_unhealthy_threshold() -> u32 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            upstream: None,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { leader: true }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            collect_interval: "30s".to_string(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            names::CPU_USAGE.to_string(),
            Thresholds { warning: 70.0, critical: 85.0 },
        );
        thresholds.insert(
            names::MEMORY_USAGE.to_string(),
            Thresholds { warning: 80.0, critical: 90.0 },
        );
        thresholds.insert(
            names::RESPONSE_TIME.to_string(),
            Thresholds { warning: 1000.0, critical: 2000.0 },
        );
        thresholds.insert(
            names::ERROR_RATE.to_string(),
            Thresholds { warning: 5.0, critical: 10.0 },
        );
        Self {
            evaluate_interval: "60s".to_string(),
            window: "5m".to_string(),
            thresholds,
        }
    }
}

impl Default for AutoscalingConfig {
    fn default() -> Self {
        let rule = |metric: &str, threshold, action, cooldown_seconds| ScalingRule {
            metric: metric.to_string(),
            threshold,
            action,
            cooldown_seconds,
            min_instances: 1,
            max_instances: 10,
        };
        Self {
            enabled: true,
            evaluate_interval: "30s".to_string(),
            initial_instances: 1,
            min_instances: 1,
            max_instances: 10,
            rules: vec![
                rule(names::CPU_USAGE, 75.0, ScalingDirection::ScaleUp, 300),
                rule(names::CPU_USAGE, 25.0, ScalingDirection::ScaleDown, 600),
                rule(names::MEMORY_USAGE, 80.0, ScalingDirection::ScaleUp, 300),
                rule(names::RESPONSE_TIME, 1000.0, ScalingDirection::ScaleUp, 180),
            ],
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: "60s".to_string(),
            max_requests: 100,
            window: "60s".to_string(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: "30s".to_string(),
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            response_time_threshold_ms: 1000.0,
            components: Vec::new(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: "1h".to_string(),
        }
    }
}

impl OpsConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: OpsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the control loops cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("metrics.collect_interval", &self.metrics.collect_interval),
            ("alerts.evaluate_interval", &self.alerts.evaluate_interval),
            ("alerts.window", &self.alerts.window),
            ("autoscaling.evaluate_interval", &self.autoscaling.evaluate_interval),
            ("gateway.open_timeout", &self.gateway.open_timeout),
            ("gateway.window", &self.gateway.window),
            ("health.check_interval", &self.health.check_interval),
            ("maintenance.cleanup_interval", &self.maintenance.cleanup_interval),
        ];
        for (field, value) in durations {
            if parse_duration(value).is_none() {
                return Err(ConfigError::Invalid(format!("{field}: bad duration {value:?}")));
            }
        }

        let scaling = &self.autoscaling;
        if scaling.min_instances == 0 || scaling.min_instances > scaling.max_instances {
            return Err(ConfigError::Invalid(format!(
                "autoscaling bounds [{}, {}] are empty or include zero",
                scaling.min_instances, scaling.max_instances
            )));
        }
        if !(scaling.min_instances..=scaling.max_instances).contains(&scaling.initial_instances) {
            return Err(ConfigError::Invalid(format!(
                "autoscaling.initial_instances {} outside [{}, {}]",
                scaling.initial_instances, scaling.min_instances, scaling.max_instances
            )));
        }
        for (metric, t) in &self.alerts.thresholds {
            if t.warning > t.critical {
                return Err(ConfigError::Invalid(format!(
                    "alerts.thresholds.{metric}: warning above critical"
                )));
            }
        }
        if self.gateway.failure_threshold == 0 || self.gateway.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "gateway thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Parse a duration string like "30s", "500ms", "5m", "1h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Parse with a fallback; used after [`OpsConfig::validate`] has passed.
pub fn duration_or(s: &str, fallback: Duration) -> Duration {
    parse_duration(s).unwrap_or(fallback)
}
