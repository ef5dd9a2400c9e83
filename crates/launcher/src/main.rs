//! Single-process launcher: scheduler plus a local comp pool.
//!
//! Wires the scheduling engine and a configurable number of comps over the
//! in-process hub, the deployment mode used for development and small
//! installations. Larger installations run comps in separate processes
//! behind the platform's pub/sub transport instead.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use gantry_comp::{Comp, CompConfig, SimulatedRunner};
use gantry_core::IdPair;
use gantry_events::CompHub;
use gantry_scheduler::{OfferScheduler, SchedulerCallback, SchedulerConfig};

/// How often the status projection is logged.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Launcher-level configuration.
///
/// | Env Var                    | Default |
/// |----------------------------|---------|
/// | `GANTRY_COMP_COUNT`        | `2`     |
/// | `GANTRY_SIMULATED_RUN_SECS`| `10`    |
struct LauncherConfig {
    comp_count: usize,
    simulated_run: Duration,
}

impl LauncherConfig {
    fn from_env() -> Self {
        let comp_count: usize = std::env::var("GANTRY_COMP_COUNT")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("GANTRY_COMP_COUNT must be a valid number");

        let run_secs: u64 = std::env::var("GANTRY_SIMULATED_RUN_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("GANTRY_SIMULATED_RUN_SECS must be a valid number of seconds");

        Self {
            comp_count,
            simulated_run: Duration::from_secs(run_secs),
        }
    }
}

/// Callback of the embedding platform. The full deployment persists the
/// failure and notifies the client; standalone we only log.
struct LoggingCallback;

impl SchedulerCallback for LoggingCallback {
    fn expire(&self, id_pair: IdPair, reason: &str) {
        tracing::warn!(job = %id_pair, reason, "Job expired");
    }

    fn new_resources_available(&self) {
        tracing::debug!("Comp capacity available, nothing queued to re-schedule");
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantryd=debug,gantry_scheduler=debug,gantry_comp=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let scheduler_config = SchedulerConfig::from_env();
    let launcher_config = LauncherConfig::from_env();
    tracing::info!(
        comp_count = launcher_config.comp_count,
        wait_timeout_ms = scheduler_config.wait_timeout.as_millis() as u64,
        heartbeat_lost_timeout_ms = scheduler_config.heartbeat_lost_timeout.as_millis() as u64,
        "Loaded configuration",
    );

    // --- Hub and engine ---
    let hub = Arc::new(CompHub::new());
    let engine = OfferScheduler::start(
        scheduler_config,
        Arc::clone(&hub),
        Arc::new(LoggingCallback),
    );
    tracing::info!("Scheduling engine started");

    // --- Comp pool ---
    let comp_config = CompConfig::from_env();
    let runner = Arc::new(SimulatedRunner::new(launcher_config.simulated_run));
    let comps: Vec<Arc<Comp>> = (0..launcher_config.comp_count)
        .map(|_| {
            Comp::start(
                Uuid::new_v4(),
                comp_config.clone(),
                Arc::clone(&hub),
                runner.clone(),
            )
        })
        .collect();
    tracing::info!(count = comps.len(), "Comp pool started");

    // --- Status logging ---
    let status_engine = Arc::clone(&engine);
    let status_hub = Arc::clone(&hub);
    let status_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
        loop {
            ticker.tick().await;
            let status = status_engine.status();
            tracing::info!(
                scheduled = status.scheduled_job_count,
                running = status.running_job_count,
                comps = status_hub.comp_count(),
                "Scheduler status",
            );
        }
    });

    // --- Run until a termination signal ---
    shutdown_signal().await;

    tracing::info!("Shutting down");
    status_handle.abort();
    for comp in &comps {
        comp.shutdown();
    }
    engine.shutdown();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the process
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
