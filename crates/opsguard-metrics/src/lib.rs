//! opsguard-metrics — the metric store and everything that feeds it.
//!
//! # Architecture
//!
//! ```text
//! MetricStore            ← append-only samples, 24h retention
//!   ▲
//! MetricsCollector
//!   ├── MetricsProvider::read()  → cpu_usage, memory_usage
//!   ├── RequestTracker::drain()  → request_count, error_rate, response_time
//!   ├── HealthAggregator         ← ServerHealth snapshot
//!   └── run() → periodic collection loop
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics/prometheus
//! ```

pub mod collector;
pub mod prometheus;
pub mod provider;
pub mod store;
pub mod tracker;

pub use collector::MetricsCollector;
pub use prometheus::{Gauge, render_prometheus};
pub use provider::{FixedProvider, HostStats, MetricsProvider, SysinfoProvider};
pub use store::MetricStore;
pub use tracker::{InFlightGuard, RequestTracker, RequestWindow};
