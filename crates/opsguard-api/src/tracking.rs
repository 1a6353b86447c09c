//! Feeds application traffic into the [`RequestTracker`].

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use opsguard_metrics::RequestTracker;

pub async fn track(
    State(tracker): State<Arc<RequestTracker>>,
    req: Request,
    next: Next,
) -> Response {
    let _in_flight = tracker.begin();
    let started = Instant::now();
    let response = next.run(req).await;
    tracker.record(started.elapsed().as_millis() as u64, response.status().as_u16());
    response
}
