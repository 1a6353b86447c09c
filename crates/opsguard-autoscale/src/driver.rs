//! Instance start/stop primitive used by the controller.

use tracing::info;

use opsguard_core::BoxFuture;

/// Moves the running application from `from` to `to` instances.
///
/// An error leaves the controller's instance count unchanged.
pub trait InstanceDriver: Send + Sync {
    fn scale_to(&self, from: u32, to: u32) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Driver that only logs the requested change.
pub struct LocalDriver;

impl InstanceDriver for LocalDriver {
    fn scale_to(&self, from: u32, to: u32) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            info!(from, to, "instance count changed");
            Ok(())
        })
    }
}
