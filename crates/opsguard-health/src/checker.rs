//! Component health checks.
//!
//! A [`ComponentCheck`] reports the status of one downstream collaborator.
//! [`HttpCheck`] probes an HTTP endpoint and debounces failures through a
//! [`HealthTracker`]; [`StaticCheck`] holds a status pushed by its owner.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use opsguard_core::config::{HttpComponentConfig, duration_or};
use opsguard_core::{BoxFuture, ComponentStatus};

/// Probe contract for a downstream collaborator.
pub trait ComponentCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Determine the current status. An `Err` means the check itself could
    /// not run; the aggregator records the component as unknown.
    fn check(&self) -> BoxFuture<'_, anyhow::Result<ComponentStatus>>;
}

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Healthy,
    /// The endpoint returned non-2xx.
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

/// Debounces consecutive probe results for one component.
///
/// Failures below the threshold report `Degraded`; reaching the threshold
/// reports `Unhealthy`. A single success restores `Healthy`.
#[derive(Debug)]
pub struct HealthTracker {
    status: ComponentStatus,
    consecutive_failures: u32,
    unhealthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            status: ComponentStatus::Unknown,
            consecutive_failures: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    /// Record a probe result and return the new status.
    pub fn record(&mut self, result: ProbeResult) -> ComponentStatus {
        match result {
            ProbeResult::Healthy => {
                if self.status != ComponentStatus::Healthy {
                    debug!(failures = self.consecutive_failures, "component recovered");
                }
                self.consecutive_failures = 0;
                self.status = ComponentStatus::Healthy;
            }
            ProbeResult::Unhealthy | ProbeResult::Failed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != ComponentStatus::Unhealthy {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "component marked unhealthy"
                        );
                    }
                    self.status = ComponentStatus::Unhealthy;
                } else {
                    self.status = ComponentStatus::Degraded;
                }
            }
        }
        self.status
    }

    pub fn status(&self) -> ComponentStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Probes `GET http://{address}{path}` for a component.
pub struct HttpCheck {
    name: String,
    address: String,
    path: String,
    timeout: Duration,
    tracker: Mutex<HealthTracker>,
}

impl HttpCheck {
    pub fn new(
        name: &str,
        address: &str,
        path: &str,
        timeout: Duration,
        unhealthy_threshold: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            path: path.to_string(),
            timeout,
            tracker: Mutex::new(HealthTracker::new(unhealthy_threshold)),
        }
    }

    pub fn from_config(config: &HttpComponentConfig) -> Self {
        Self::new(
            &config.name,
            &config.address,
            &config.path,
            duration_or(&config.timeout, Duration::from_secs(2)),
            config.unhealthy_threshold,
        )
    }
}

impl ComponentCheck for HttpCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> BoxFuture<'_, anyhow::Result<ComponentStatus>> {
        Box::pin(async move {
            let result = http_probe(&self.address, &self.path, self.timeout).await;
            let mut tracker = self.tracker.lock().expect("health tracker lock");
            Ok(tracker.record(result))
        })
    }
}

/// A check whose status is set by its owner.
pub struct StaticCheck {
    name: String,
    status: RwLock<ComponentStatus>,
}

impl StaticCheck {
    pub fn new(name: &str, status: ComponentStatus) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            status: RwLock::new(status),
        })
    }

    pub fn set(&self, status: ComponentStatus) {
        *self.status.write().expect("static check lock") = status;
    }
}

impl ComponentCheck for StaticCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> BoxFuture<'_, anyhow::Result<ComponentStatus>> {
        let status = *self.status.read().expect("static check lock");
        Box::pin(async move { Ok(status) })
    }
}

/// Perform an HTTP health probe against an endpoint.
///
/// Returns `Healthy` if the response is 2xx, `Unhealthy` for non-2xx,
/// or `Failed` if the connection fails or times out.
pub async fn http_probe(address: &str, path: &str, timeout: Duration) -> ProbeResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", address)
            .header("user-agent", "opsguard-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "health probe request invalid");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => ProbeResult::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "health probe non-2xx");
                ProbeResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    result.unwrap_or_else(|_| {
        debug!(%uri, "health probe timed out");
        ProbeResult::Failed
    })
}
