//! Replica autoscaler
//!
//! Polls a service's reported high-priority CPU utilization and replica
//! count, and moves the replica count one step toward the configured
//! threshold on every cycle.
//!
//! ## Architecture
//!
//! - **Scaling Loop**: fetch status, decide, submit the update, sleep
//! - **Probe Server**: answers `/healthz` and `/readyz` for the orchestrator

use std::time::Duration;

use anyhow::Result;
use replica_autoscaler::{cli::Args, telemetry, Autoscaler, Config, ProbeServer};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() -> Result<()> {
    // Console logging until the config says otherwise
    let bootstrap = tracing::subscriber::set_default(telemetry::bootstrap_subscriber());

    let args = Args::parse_or_exit();
    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "Failed to load configuration");
            std::process::exit(FAILURE_EXIT_CODE);
        }
    };

    drop(bootstrap);
    let log_guard = telemetry::init(&config.logging)?;

    info!("Starting replica autoscaler");
    info!(
        base_url = %config.base_url,
        cpu_threshold = config.cpu_threshold,
        scale_up_step = config.scale_up_step,
        scale_down_step = config.scale_down_step,
        poll_interval_secs = config.poll_interval,
        probe_port = config.probe_port,
        "Configuration loaded"
    );

    let autoscaler = Autoscaler::new(&config)?;

    let probe = match ProbeServer::bind(config.probe_port).await {
        Ok(probe) => probe,
        Err(e) => {
            error!(error = %e, "Failed to start probe server");
            exit_after_flush(log_guard);
        }
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut probe_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { probe.serve(shutdown_rx).await }
    });

    let loop_handle = tokio::spawn(async move {
        autoscaler.run(shutdown_rx).await;
    });

    let mut probe_failed = false;
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Autoscaler stopped by user input");
        }
        result = &mut probe_handle => {
            probe_failed = true;
            match result {
                Ok(Ok(())) => error!("Probe server exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "Probe server error"),
                Err(e) => error!(error = %e, "Probe server task panicked"),
            }
        }
    }

    // Signal shutdown to both tasks
    let _ = shutdown_tx.send(true);

    let shutdown_timeout = Duration::from_secs(10);
    if tokio::time::timeout(shutdown_timeout, loop_handle).await.is_err() {
        warn!("Autoscaler loop did not shut down in time");
    }
    if !probe_failed && tokio::time::timeout(shutdown_timeout, probe_handle).await.is_err() {
        warn!("Probe server did not shut down in time");
    }

    if probe_failed {
        exit_after_flush(log_guard);
    }

    info!("Autoscaler shutdown complete");
    Ok(())
}

/// Exit status for fatal startup and runtime errors.
const FAILURE_EXIT_CODE: i32 = 1;

/// Flush the log file, then exit with a failure status. The cause has
/// already been logged.
fn exit_after_flush(log_guard: WorkerGuard) -> ! {
    drop(log_guard);
    std::process::exit(FAILURE_EXIT_CODE);
}

/// Wait for SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
