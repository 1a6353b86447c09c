//! Upstream forwarding for admitted application traffic.
//!
//! One HTTP/1.1 connection per forwarded request. Connection and protocol
//! failures become 502, timeouts 504, so both count against the breaker.

use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    address: String,
    timeout: Duration,
}

impl UpstreamProxy {
    /// `address` is the upstream `host:port`.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn forward(&self, req: Request) -> Response {
        match tokio::time::timeout(self.timeout, self.send(req)).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                warn!(upstream = %self.address, error = %e, "upstream request failed");
                upstream_error(StatusCode::BAD_GATEWAY, "upstream unavailable")
            }
            Err(_) => {
                warn!(
                    upstream = %self.address,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "upstream timed out"
                );
                upstream_error(StatusCode::GATEWAY_TIMEOUT, "upstream timed out")
            }
        }
    }

    async fn send(
        &self,
        req: Request,
    ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>> {
        let stream = tokio::net::TcpStream::connect(&self.address).await?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Body>(io).await?;

        let upstream = self.address.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(%upstream, error = %e, "upstream connection closed with error");
            }
        });

        let (mut parts, body) = req.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        parts.uri = path.parse::<Uri>()?;
        parts
            .headers
            .insert(header::HOST, HeaderValue::from_str(&self.address)?);

        let resp = sender
            .send_request(Request::from_parts(parts, body))
            .await?;
        Ok(resp.map(Body::new))
    }
}

fn upstream_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
