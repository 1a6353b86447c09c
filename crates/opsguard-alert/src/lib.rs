//! opsguard-alert — threshold alerting over the metric store.
//!
//! Every tick the [`AlertEngine`] averages each monitored metric over a
//! trailing window and compares it to its warning/critical thresholds:
//!
//! ```text
//! avg > critical             → ensure `{metric}_critical` is open
//! warning < avg <= critical  → ensure `{metric}_warning` is open
//! avg <= warning             → resolve both
//! ```
//!
//! Opening a critical alert sends exactly one [`Notice`] through the
//! [`Notifier`]. Delivery failures are logged and never change alert state.

pub mod engine;
pub mod notifier;

pub use engine::AlertEngine;
pub use notifier::{LogNotifier, MemoryNotifier, Notice, NoticeLevel, Notifier, notify_best_effort};
