pub mod handler;
pub mod keys;
pub mod terminal;

use crate::context::AppContext;
use crate::session::state::Protocol;
use crate::utils::generate_session_id;
use anyhow::Result;
use handler::SshHandler;
use russh::{MethodKind, MethodSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Accept loop for the SSH listener.
///
/// russh is driven per-connection via `run_stream` instead of its own
/// listener so the admission decision happens on the raw socket, before any
/// protocol state is allocated: a rejected peer sees nothing but a close.
pub async fn start_ssh_server(
    ctx: Arc<AppContext>,
    host_key: russh::keys::PrivateKey,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut config = russh::server::Config::default();
    config.keys.push(host_key);
    config.server_id = russh::SshId::Standard(ctx.config.ssh.server_id.clone());
    config.methods = MethodSet::from([MethodKind::Password].as_slice());
    config.auth_rejection_time = Duration::from_secs(1);
    config.auth_rejection_time_initial = Some(Duration::ZERO);
    let config = Arc::new(config);

    let listener = TcpListener::bind(&ctx.config.ssh.listen).await?;
    info!(addr = %ctx.config.ssh.listen, "SSH listener ready");

    let semaphore = Arc::new(Semaphore::new(ctx.config.ssh.max_connections as usize));

    loop {
        let (stream, peer) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "SSH accept error");
                        continue;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("SSH listener shutting down (no new connections)");
                break;
            }
        };

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(ip = %peer.ip(), "SSH listener at capacity, dropping connection");
                drop(stream);
                continue;
            }
        };

        let ip = peer.ip();
        if let Err(reason) = ctx.admission.try_admit(ip) {
            warn!(ip = %ip, reason = %reason, "SSH connection rejected");
            ctx.audit
                .log_admission_rejected(ip, Protocol::Ssh.as_str(), reason.as_str());
            drop(stream);
            continue;
        }

        let session_id = generate_session_id();
        ctx.audit
            .log_connection_new(&session_id, ip, Protocol::Ssh.as_str());
        info!(ip = %ip, session_id = %session_id, "New SSH connection");

        let ctx = ctx.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _permit = permit;
            // Shell channels run as separate machine tasks; the tracker lets
            // teardown wait for their summaries before the slot is released.
            let machines = TaskTracker::new();
            let handler = SshHandler::new(
                ctx.clone(),
                peer,
                session_id.clone(),
                machines.clone(),
                shutdown.clone(),
            );

            match russh::server::run_stream(config, stream, handler).await {
                Ok(running) => {
                    tokio::select! {
                        result = running => {
                            if let Err(e) = result {
                                debug!(session_id = %session_id, error = %e, "SSH session ended with error");
                            }
                        }
                        _ = shutdown.cancelled() => {
                            debug!(session_id = %session_id, "SSH connection closed by shutdown");
                        }
                    }
                }
                Err(e) => {
                    debug!(session_id = %session_id, ip = %ip, error = %e, "SSH handshake failed");
                }
            }

            machines.close();
            machines.wait().await;

            ctx.audit
                .log_connection_closed(&session_id, ip, Protocol::Ssh.as_str());
            ctx.admission.release(ip);
        });
    }

    Ok(())
}
