pub mod events;

use events::AuditEvent;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

const AUDIT_CHANNEL_CAPACITY: usize = 10_000;

/// Asynchronous audit logger.
///
/// Producers hand events to a bounded channel; a single writer task
/// serializes them to one JSON line each and appends to the audit file,
/// rotating by size. The single-consumer design keeps records from
/// interleaving and preserves per-session ordering (each session is one
/// producer, and the channel is FIFO per producer).
pub struct AuditLogger {
    sender: mpsc::Sender<AuditEvent>,
    dropped_count: AtomicU64,
}

impl AuditLogger {
    pub fn new(log_path: Option<PathBuf>, max_size_bytes: u64, max_files: u32) -> Self {
        let (sender, receiver) = mpsc::channel(AUDIT_CHANNEL_CAPACITY);

        tokio::spawn(audit_writer_task(
            receiver,
            log_path,
            max_size_bytes,
            max_files,
        ));

        Self {
            sender,
            dropped_count: AtomicU64::new(0),
        }
    }

    /// Create a no-op audit logger for testing (no tokio runtime required).
    /// Events sent to this logger are silently dropped.
    pub fn new_noop() -> Self {
        let (sender, _receiver) = mpsc::channel(1);
        Self {
            sender,
            dropped_count: AtomicU64::new(0),
        }
    }

    /// Number of audit events dropped due to channel overflow
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn log_connection_new(&self, session_id: &str, source_ip: IpAddr, protocol: &str) {
        self.try_send(AuditEvent::connection_new(session_id, source_ip, protocol));
    }

    pub fn log_connection_closed(&self, session_id: &str, source_ip: IpAddr, protocol: &str) {
        self.try_send(AuditEvent::connection_closed(session_id, source_ip, protocol));
    }

    pub fn log_admission_rejected(&self, source_ip: IpAddr, protocol: &str, reason: &str) {
        self.try_send(AuditEvent::admission_rejected(source_ip, protocol, reason));
    }

    pub fn log_auth_attempt(
        &self,
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
        password: &str,
    ) {
        self.try_send(AuditEvent::auth_attempt(
            session_id, source_ip, protocol, username, password,
        ));
    }

    pub fn log_auth_success(
        &self,
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
    ) {
        self.try_send(AuditEvent::auth_success(
            session_id, source_ip, protocol, username,
        ));
    }

    pub fn log_auth_failure(
        &self,
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
        attempt: u32,
    ) {
        self.try_send(AuditEvent::auth_failure(
            session_id, source_ip, protocol, username, attempt,
        ));
    }

    pub fn log_command(
        &self,
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
        command: &str,
    ) {
        self.try_send(AuditEvent::command_executed(
            session_id, source_ip, protocol, username, command,
        ));
    }

    pub fn log_dangerous_command(
        &self,
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: &str,
        command: &str,
    ) {
        self.try_send(AuditEvent::command_dangerous(
            session_id, source_ip, protocol, username, command,
        ));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_session_summary(
        &self,
        session_id: &str,
        source_ip: IpAddr,
        protocol: &str,
        username: Option<&str>,
        duration_secs: u64,
        command_count: u64,
        commands: Vec<String>,
    ) {
        self.try_send(AuditEvent::session_summary(
            session_id,
            source_ip,
            protocol,
            username,
            duration_secs,
            command_count,
            commands,
        ));
    }

    pub fn log_event(&self, event: AuditEvent) {
        self.try_send(event);
    }

    fn try_send(&self, event: AuditEvent) {
        let is_critical = event.is_critical();

        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) if is_critical => {
                // Critical events get one more chance via a reserved permit so a
                // connection flood cannot push the verdict records off the channel.
                match self.sender.try_reserve() {
                    Ok(permit) => permit.send(event),
                    Err(_) => self.record_drop(),
                }
            }
            Err(_) => self.record_drop(),
        }
    }

    fn record_drop(&self) {
        let dropped = self.dropped_count.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped % 100 == 1 {
            warn!(
                total_dropped = dropped,
                "Audit events being dropped due to channel overflow"
            );
        }
    }
}

async fn audit_writer_task(
    mut receiver: mpsc::Receiver<AuditEvent>,
    log_path: Option<PathBuf>,
    max_size_bytes: u64,
    max_files: u32,
) {
    let mut file = if let Some(path) = &log_path {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
        {
            Ok(f) => Some(f),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to open audit log");
                None
            }
        }
    } else {
        None
    };

    let mut current_size: u64 = if let (Some(path), Some(_)) = (&log_path, &file) {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    } else {
        0
    };

    while let Some(event) = receiver.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => {
                // Human-readable mirror for operators watching the console.
                debug!(event = %json, "Audit event");
                if let Some(ref mut f) = file {
                    let line = format!("{}\n", json);
                    let line_bytes = line.as_bytes();
                    if let Err(e) = f.write_all(line_bytes).await {
                        error!(error = %e, "Failed to write audit log");
                        continue;
                    }
                    if let Err(e) = f.flush().await {
                        error!(error = %e, "Failed to flush audit log");
                    }
                    current_size += line_bytes.len() as u64;

                    if max_size_bytes > 0 && current_size >= max_size_bytes {
                        if let Some(ref path) = log_path {
                            drop(file.take());
                            rotate_audit_files(path, max_files).await;
                            match tokio::fs::OpenOptions::new()
                                .create(true)
                                .append(true)
                                .open(path)
                                .await
                            {
                                Ok(new_file) => {
                                    file = Some(new_file);
                                    current_size = 0;
                                }
                                Err(e) => {
                                    error!(error = %e, "Failed to reopen audit log after rotation");
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to serialize audit event");
            }
        }
    }
}

/// Rotate audit log files: audit.json -> audit.json.1, audit.json.1 -> audit.json.2, etc.
async fn rotate_audit_files(path: &std::path::Path, max_files: u32) {
    for i in (1..max_files).rev() {
        let from = format!("{}.{}", path.display(), i);
        let to = format!("{}.{}", path.display(), i + 1);
        let _ = tokio::fs::rename(&from, &to).await;
    }
    let rotated = format!("{}.1", path.display());
    if let Err(e) = tokio::fs::rename(path, &rotated).await {
        error!(error = %e, "Failed to rotate audit log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_logger_swallows_events() {
        let audit = AuditLogger::new_noop();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        // Channel capacity 1 with no consumer: the first event sits in the
        // buffer, later ones are counted as dropped.
        audit.log_connection_new("aaaa0001", ip, "ssh");
        audit.log_connection_new("aaaa0002", ip, "ssh");
        audit.log_connection_new("aaaa0003", ip, "ssh");
        assert!(audit.dropped_count() >= 1);
    }

    #[tokio::test]
    async fn writer_appends_one_json_line_per_event() {
        let dir = std::env::temp_dir().join(format!("tarpot-audit-{}", std::process::id()));
        let path = dir.join("audit.json");
        let _ = tokio::fs::remove_file(&path).await;

        let audit = AuditLogger::new(Some(path.clone()), 0, 0);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        audit.log_auth_attempt("ab12cd34", ip, "telnet", "admin", "admin");
        audit.log_auth_failure("ab12cd34", ip, "telnet", "admin", 1);

        // Give the writer task a moment to drain.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
        assert!(lines[0].contains("auth.attempt"));
        assert!(lines[1].contains("auth.failure"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
