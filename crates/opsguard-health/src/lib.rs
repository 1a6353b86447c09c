//! opsguard-health — health aggregation for the operations-control core.
//!
//! Polls downstream collaborators (database, cache, CDN) through
//! [`ComponentCheck`]s, keeps the latest [`ServerHealth`] snapshot pushed
//! by the metrics collector, and folds both into one overall status.
//!
//! # Classification
//!
//! ```text
//! issues = components in {degraded, unhealthy}
//!        + server readings above their thresholds (cpu, memory, latency)
//!
//! 0     → healthy
//! 1..=2 → degraded
//! > 2   → unhealthy
//! ```
//!
//! [`ServerHealth`]: opsguard_core::ServerHealth

pub mod aggregator;
pub mod checker;

pub use aggregator::{HealthAggregator, HealthThresholds};
pub use checker::{ComponentCheck, HealthTracker, HttpCheck, ProbeResult, StaticCheck};
