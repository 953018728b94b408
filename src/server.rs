use crate::admission::AdmissionController;
use crate::audit::AuditLogger;
use crate::config::types::AppConfig;
use crate::context::AppContext;
use crate::ssh;
use crate::telnet;

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main server orchestrator: builds the shared services, starts whichever
/// listeners are enabled, and supervises shutdown.
///
/// Listener startup failures are fatal to that listener only; the other
/// protocol keeps serving. A deployment that loses its Telnet port still
/// catches SSH scanners.
pub async fn run(config: AppConfig) -> Result<()> {
    let config = Arc::new(config);

    let audit = Arc::new(AuditLogger::new(
        config.logging.audit_log_path.clone(),
        config.logging.audit_max_size_mb * 1024 * 1024,
        config.logging.audit_max_files,
    ));
    let admission = Arc::new(AdmissionController::new(&config));
    let ctx = Arc::new(AppContext::new(
        config.clone(),
        admission.clone(),
        audit.clone(),
    ));

    let shutdown = CancellationToken::new();

    // Periodically drop aged-out rate-limit windows for idle peers.
    {
        let admission = admission.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        admission.prune_windows();
                        let stats = admission.stats_snapshot();
                        tracing::debug!(
                            active = stats.total,
                            unique_peers = stats.unique_peers,
                            "Connection ledger"
                        );
                    }
                }
            }
        });
    }

    if config.ssh.enabled {
        match ssh::keys::load_or_generate_host_key(&config.ssh.host_key_path) {
            Ok(host_key) => {
                info!(path = %config.ssh.host_key_path.display(), "Host key loaded");
                let ctx = ctx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = ssh::start_ssh_server(ctx, host_key, shutdown).await {
                        error!(error = %e, "SSH listener failed to start");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "SSH listener startup failed (host key)");
            }
        }
    }

    if config.telnet.enabled {
        let ctx = ctx.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = telnet::start_telnet_server(ctx, shutdown).await {
                error!(error = %e, "Telnet listener failed to start");
            }
        });
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            handle_signals(shutdown).await;
        });
    }

    info!("All enabled services started");

    shutdown.cancelled().await;

    // Listeners observed the token and stopped accepting; wait for active
    // sessions to emit their summaries, bounded by the shutdown timeout.
    let shutdown_timeout = config.limits.shutdown_timeout;
    info!(timeout = shutdown_timeout, "Initiating graceful shutdown");

    let drain_deadline =
        tokio::time::Instant::now() + std::time::Duration::from_secs(shutdown_timeout);
    loop {
        let active = ctx.admission.active_count();
        if active == 0 {
            info!("All sessions drained");
            break;
        }
        if tokio::time::Instant::now() >= drain_deadline {
            warn!(active_sessions = active, "Shutdown timeout reached, forcing exit");
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }

    info!("Graceful shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn handle_signals(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGINT handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM received, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }
    shutdown.cancel();
}

#[cfg(not(unix))]
async fn handle_signals(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received, initiating graceful shutdown");
        shutdown.cancel();
    }
}
