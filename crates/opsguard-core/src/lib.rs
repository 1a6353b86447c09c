//! opsguard-core — shared vocabulary for the operations-control core.
//!
//! Holds the data model every other opsguard crate speaks (metrics,
//! alerts, scaling rules and actions, health snapshots, gateway state),
//! the [`Clock`] abstraction used for all time arithmetic, and the
//! TOML-backed [`OpsConfig`].

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OpsConfig, parse_duration};
pub use error::ConfigError;
pub use types::*;

/// Boxed future returned by collaborator contracts (notifier, providers,
/// drivers) so they stay object-safe behind `Arc<dyn _>`.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
