//! opsguard-autoscale — rule-driven instance scaling.
//!
//! The [`ScalingController`] reads the latest value of each rule's metric
//! from the [`MetricStore`](opsguard_metrics::MetricStore) and moves the
//! instance count one step at a time.
//!
//! # Control loop
//!
//! ```text
//! for rule in rules:
//!     value = latest(rule.metric)
//!     fire  = scale_up   && value > rule.threshold
//!          || scale_down && value < rule.threshold
//!     skip if now - rule.last_action < rule.cooldown_seconds
//!     target = current ± 1, skip unless within the rule's bounds
//!     driver.scale_to(current, target)
//! ```
//!
//! At most one automatic action runs per tick. Manual and emergency
//! scaling bypass the rules and restart every rule's cooldown.

pub mod driver;
pub mod error;
pub mod forecast;
pub mod scaler;

pub use driver::{InstanceDriver, LocalDriver};
pub use error::ScaleError;
pub use forecast::{HistoryForecast, LoadForecast, StaticForecast};
pub use scaler::{AutoscalingStatus, ScalingController, ScalingMetrics};
