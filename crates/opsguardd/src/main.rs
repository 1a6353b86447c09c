//! opsguardd — the opsguard daemon.
//!
//! Single binary that assembles every opsguard subsystem:
//! - Metric store + collector (host stats, request tracking)
//! - Health aggregator (component probes)
//! - Alert engine (leader only)
//! - Scaling controller (leader only)
//! - Resilience gateway in front of the application
//! - REST API
//!
//! # Usage
//!
//! ```text
//! opsguardd run --config /etc/opsguard/opsguard.toml
//! opsguardd check-config /etc/opsguard/opsguard.toml
//! opsguardd print-config
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use opsguard_api::{AppContext, Collaborators, build_router};
use opsguard_core::OpsConfig;
use opsguard_core::config::duration_or;

#[derive(Parser)]
#[command(name = "opsguardd", about = "opsguard operations-control daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Run {
        /// Path to opsguard.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override `[server].port`.
        #[arg(long)]
        port: Option<u16>,

        /// Override `[cluster].leader`.
        #[arg(long)]
        follower: bool,

        /// Emit JSON log lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Parse and validate a config file, then exit.
    CheckConfig {
        path: PathBuf,
    },
    /// Print the default configuration as TOML.
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            follower,
            log_json,
        } => {
            init_tracing(log_json);
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if follower {
                config.cluster.leader = false;
            }
            run(config).await
        }
        Command::CheckConfig { path } => {
            let config = load_config(Some(&path))?;
            println!(
                "{}: ok ({} alert thresholds, {} scaling rules, {} health components)",
                path.display(),
                config.alerts.thresholds.len(),
                config.autoscaling.rules.len(),
                config.health.components.len()
            );
            Ok(())
        }
        Command::PrintConfig => {
            print!("{}", OpsConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,opsguard=debug,opsguardd=debug")
    });
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<OpsConfig> {
    let config = match path {
        Some(path) => OpsConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?,
        None => OpsConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

async fn run(config: OpsConfig) -> anyhow::Result<()> {
    info!(leader = config.cluster.leader, "opsguard daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let ctx = AppContext::build(&config, Collaborators::system());
    info!(
        components = config.health.components.len(),
        upstream = ?config.server.upstream,
        "subsystems initialized"
    );

    let collect_every = duration_or(&config.metrics.collect_interval, Duration::from_secs(30));
    let health_every = duration_or(&config.health.check_interval, Duration::from_secs(30));
    let alert_every = duration_or(&config.alerts.evaluate_interval, Duration::from_secs(60));
    let scale_every = duration_or(&config.autoscaling.evaluate_interval, Duration::from_secs(30));
    let cleanup_every =
        duration_or(&config.maintenance.cleanup_interval, Duration::from_secs(3600));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    // ── Start background tasks ─────────────────────────────────

    {
        let collector = ctx.collector.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { collector.run(collect_every, rx).await }));
    }
    {
        let health = ctx.health.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { health.run(health_every, rx).await }));
    }
    {
        let ctx = ctx.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { ctx.run_maintenance(cleanup_every, rx).await }));
    }

    if ctx.leader {
        let alerts = ctx.alerts.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { alerts.run(alert_every, rx).await }));

        let scaler = ctx.scaler.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { scaler.run(scale_every, rx).await }));
    } else {
        info!("follower replica: alert and scaling loops not started");
    }

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    // Graceful shutdown on Ctrl-C.
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    })
    .await?;

    // Wait for background tasks.
    for handle in handles {
        let _ = handle.await;
    }

    info!("opsguard daemon stopped");
    Ok(())
}
