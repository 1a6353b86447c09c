//! Host statistics providers.
//!
//! The collector asks a [`MetricsProvider`] for cpu and memory usage once
//! per tick. [`SysinfoProvider`] reads the real host; [`FixedProvider`]
//! returns whatever it was last told, for tests and demos.

use std::sync::{Mutex, RwLock};

use sysinfo::System;

use opsguard_core::BoxFuture;

/// Host-level utilisation, both in percent (0–100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostStats {
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

pub trait MetricsProvider: Send + Sync {
    fn read(&self) -> BoxFuture<'_, anyhow::Result<HostStats>>;
}

/// Reads global cpu and memory usage through `sysinfo`.
///
/// Cpu usage is computed between consecutive refreshes, so the very first
/// reading after construction is 0.
pub struct SysinfoProvider {
    system: Mutex<System>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    fn sample(&self) -> anyhow::Result<HostStats> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| anyhow::anyhow!("sysinfo state poisoned"))?;
        system.refresh_cpu();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            anyhow::bail!("host reported zero total memory");
        }
        Ok(HostStats {
            cpu_usage: f64::from(system.global_cpu_info().cpu_usage()),
            memory_usage: system.used_memory() as f64 / total as f64 * 100.0,
        })
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SysinfoProvider {
    fn read(&self) -> BoxFuture<'_, anyhow::Result<HostStats>> {
        let result = self.sample();
        Box::pin(async move { result })
    }
}

/// Deterministic provider: returns the configured stats, or an error once
/// told to fail.
pub struct FixedProvider {
    reading: RwLock<Result<HostStats, String>>,
}

impl FixedProvider {
    pub fn new(cpu_usage: f64, memory_usage: f64) -> Self {
        Self {
            reading: RwLock::new(Ok(HostStats {
                cpu_usage,
                memory_usage,
            })),
        }
    }

    pub fn set(&self, cpu_usage: f64, memory_usage: f64) {
        *self.reading.write().expect("provider lock") = Ok(HostStats {
            cpu_usage,
            memory_usage,
        });
    }

    pub fn fail_with(&self, message: &str) {
        *self.reading.write().expect("provider lock") = Err(message.to_string());
    }
}

impl MetricsProvider for FixedProvider {
    fn read(&self) -> BoxFuture<'_, anyhow::Result<HostStats>> {
        let reading = self.reading.read().expect("provider lock").clone();
        Box::pin(async move { reading.map_err(anyhow::Error::msg) })
    }
}
