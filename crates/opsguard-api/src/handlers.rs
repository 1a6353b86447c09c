//! REST API handlers.
//!
//! Every handler reads the shared [`AppContext`] and answers with the
//! `{success, data | error}` envelope.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use opsguard_core::{
    Alert, CircuitState, ComponentHealth, DAY_MS, HOUR_MS, OverallHealth, ServerHealth, names,
};
use opsguard_metrics::{Gauge, render_prometheus};

use crate::AppContext;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        })
    }

    fn ok_with_message(message: String, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message),
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            message: None,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

// ── Status ─────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    overall: OverallHealth,
    issues: Vec<String>,
    metrics: ServerHealth,
    components: Vec<ComponentHealth>,
    alerts: Vec<Alert>,
    uptime: u64,
    leader: bool,
}

/// GET /status
pub async fn status(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let issues = ctx.health.issues();
    ApiResponse::ok(StatusReport {
        overall: OverallHealth::from_issue_count(issues.len()),
        issues,
        metrics: ctx.health.server(),
        components: ctx.health.components(),
        alerts: ctx.alerts.active_alerts(),
        uptime: ctx.uptime_secs(),
        leader: ctx.leader,
    })
}

/// GET /alerts
pub async fn alerts(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    ApiResponse::ok(ctx.alerts.all_alerts())
}

// ── Metrics ────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    time_range: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    time_range: String,
    request_volume: f64,
    average_response_time: f64,
    error_rate: f64,
    peak_cpu_usage: f64,
    peak_memory_usage: f64,
    uptime_percentage: f64,
}

/// Look-back for a `timeRange` value. Anything past the store's 24h
/// retention simply sees the retained samples.
fn range_ms(range: &str) -> Option<u64> {
    match range {
        "hour" => Some(HOUR_MS),
        "day" => Some(DAY_MS),
        "week" => Some(7 * DAY_MS),
        _ => None,
    }
}

/// GET /metrics?timeRange=hour|day|week
pub async fn metrics(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let range = query.time_range.as_deref().unwrap_or("hour");
    let Some(span) = range_ms(range) else {
        return error_response(
            &format!("invalid timeRange {range:?}; expected hour, day, or week"),
            StatusCode::BAD_REQUEST,
        );
    };

    let since = ctx.clock.now_ms().saturating_sub(span);
    let store = &ctx.store;
    ApiResponse::ok(MetricsSummary {
        time_range: range.to_string(),
        request_volume: store.sum(names::REQUEST_COUNT, since),
        average_response_time: store.average(names::RESPONSE_TIME, since).unwrap_or(0.0),
        error_rate: store.average(names::ERROR_RATE, since).unwrap_or(0.0),
        peak_cpu_usage: store.peak(names::CPU_USAGE, since).unwrap_or(0.0),
        peak_memory_usage: store.peak(names::MEMORY_USAGE, since).unwrap_or(0.0),
        uptime_percentage: store
            .average(names::HEALTH_SCORE, since)
            .map_or(100.0, |score| score * 100.0),
    })
    .into_response()
}

/// GET /metrics/prometheus
pub async fn prometheus(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let latest: Vec<_> = names::ALL
        .iter()
        .filter_map(|name| ctx.store.latest(name))
        .collect();
    let breaker = ctx.gateway.breaker().state();
    let extra = [
        Gauge {
            name: "instances",
            help: "Running application instances.",
            value: f64::from(ctx.scaler.current_instances().await),
        },
        Gauge {
            name: "circuit_state",
            help: "Circuit breaker state (0 closed, 1 half-open, 2 open).",
            value: match breaker {
                CircuitState::Closed => 0.0,
                CircuitState::HalfOpen => 1.0,
                CircuitState::Open => 2.0,
            },
        },
        Gauge {
            name: "active_alerts",
            help: "Unresolved alerts.",
            value: ctx.alerts.active_alerts().len() as f64,
        },
    ];

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_prometheus(&latest, &extra),
    )
}

// ── Autoscaling ────────────────────────────────────────────────

/// GET /autoscaling/status
pub async fn autoscaling_status(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    ApiResponse::ok(ctx.scaler.status().await)
}

/// GET /autoscaling/metrics
pub async fn autoscaling_metrics(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    ApiResponse::ok(ctx.scaler.scaling_metrics().await)
}

/// GET /autoscaling/recommendations
pub async fn recommendations(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    ApiResponse::ok(ctx.scaler.recommendations().await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRequest {
    pub target_instances: i64,
    pub reason: Option<String>,
}

/// POST /autoscaling/scale
pub async fn manual_scale(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<ScaleRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST),
    };
    let reason = req.reason.as_deref().unwrap_or("manual request");
    match ctx.scaler.manual_scale(req.target_instances, reason).await {
        Ok(action) if action.success => ApiResponse::ok_with_message(
            format!(
                "scaled from {} to {} instances",
                action.instances_before, action.instances_after
            ),
            action,
        )
        .into_response(),
        Ok(action) => error_response(
            &format!("scaling failed: {}", action.reason),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    }
}

#[derive(Deserialize)]
pub struct EmergencyRequest {
    pub reason: Option<String>,
}

/// POST /autoscaling/emergency
pub async fn emergency_scale(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<EmergencyRequest>,
) -> impl IntoResponse {
    let reason = req.reason.as_deref().unwrap_or("operator request");
    let action = ctx.scaler.emergency_scale(reason).await;
    ApiResponse::ok_with_message(
        format!("emergency scale to {} instances", action.instances_after),
        action,
    )
}

#[derive(Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

/// PUT /autoscaling/enabled
pub async fn set_enabled(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<EnabledRequest>,
) -> impl IntoResponse {
    ctx.scaler.set_enabled(req.enabled).await;
    ApiResponse::ok_with_message(
        format!("autoscaling {}", if req.enabled { "enabled" } else { "disabled" }),
        serde_json::json!({ "enabled": req.enabled }),
    )
}

// ── Gateway ────────────────────────────────────────────────────

/// GET /loadbalancer/status
pub async fn gateway_status(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    ApiResponse::ok(ctx.gateway.status())
}

/// GET /loadbalancer/metrics
pub async fn gateway_metrics(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    ApiResponse::ok(ctx.gateway.metrics())
}

/// POST /loadbalancer/reset
pub async fn gateway_reset(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    ctx.gateway.breaker().reset();
    info!("circuit breaker reset via API");
    ApiResponse::ok(ctx.gateway.breaker().snapshot())
}

// ── Application traffic ────────────────────────────────────────

/// Anything not served by the ops API: forwarded upstream when one is
/// configured.
pub async fn application(State(ctx): State<Arc<AppContext>>, req: Request) -> Response {
    match &ctx.upstream {
        Some(upstream) => upstream.forward(req).await,
        None => error_response("no route", StatusCode::NOT_FOUND),
    }
}
