//! opsguard-api — REST API for the operations-control core.
//!
//! Ops routes are served directly. Everything else is application
//! traffic: it is counted by the request tracker, passes the gateway
//! guards, and is forwarded upstream when one is configured.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/status` | Overall health, components, active alerts, uptime |
//! | GET | `/alerts` | All tracked alerts |
//! | GET | `/metrics?timeRange=hour\|day\|week` | Aggregated metrics |
//! | GET | `/metrics/prometheus` | Prometheus exposition |
//! | GET | `/autoscaling/status` | Controller state and recent history |
//! | GET | `/autoscaling/metrics` | 24h scaling aggregates |
//! | GET | `/autoscaling/recommendations` | Non-binding advice |
//! | POST | `/autoscaling/scale` | Manual scale to `targetInstances` |
//! | POST | `/autoscaling/emergency` | Scale to the maximum |
//! | PUT | `/autoscaling/enabled` | Toggle the control loop |
//! | GET | `/loadbalancer/status` | Breaker and limiter configuration |
//! | GET | `/loadbalancer/metrics` | Gateway counters and snapshots |
//! | POST | `/loadbalancer/reset` | Force the breaker closed |

pub mod context;
pub mod handlers;
pub mod tracking;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{any, get, post, put};

use opsguard_gateway::middleware::guard;

pub use context::{AppContext, Collaborators, MaintenanceReport};

/// Build the complete router: ops API plus guarded application traffic.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let ops = Router::new()
        .route("/status", get(handlers::status))
        .route("/alerts", get(handlers::alerts))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/prometheus", get(handlers::prometheus))
        .route("/autoscaling/status", get(handlers::autoscaling_status))
        .route("/autoscaling/metrics", get(handlers::autoscaling_metrics))
        .route("/autoscaling/recommendations", get(handlers::recommendations))
        .route("/autoscaling/scale", post(handlers::manual_scale))
        .route("/autoscaling/emergency", post(handlers::emergency_scale))
        .route("/autoscaling/enabled", put(handlers::set_enabled))
        .route("/loadbalancer/status", get(handlers::gateway_status))
        .route("/loadbalancer/metrics", get(handlers::gateway_metrics))
        .route("/loadbalancer/reset", post(handlers::gateway_reset))
        .with_state(ctx.clone());

    let application = Router::new()
        .route("/", any(handlers::application))
        .route("/{*path}", any(handlers::application))
        .layer(from_fn_with_state(ctx.gateway.clone(), guard))
        .layer(from_fn_with_state(ctx.tracker.clone(), tracking::track))
        .with_state(ctx);

    ops.merge(application)
}
