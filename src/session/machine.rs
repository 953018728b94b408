use crate::context::AppContext;
use crate::session::channel::{ReadEvent, SessionChannel};
use crate::session::state::ClientSession;
use crate::shell::{ReplyKind, ShellEngine};
use crate::utils::format_duration;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many history entries the session summary carries.
const SUMMARY_COMMANDS: usize = 20;

/// Per-connection actor driving the authentication → shell lifecycle over
/// any [`SessionChannel`]. Owns its `ClientSession` exclusively; the only
/// shared things it touches are the audit logger and the clock.
pub struct SessionMachine {
    ctx: Arc<AppContext>,
    session: ClientSession,
    /// Process-wide shutdown: observed at every read, treated as end of
    /// input so the session still emits its summary before the drain ends.
    shutdown: CancellationToken,
}

impl SessionMachine {
    pub fn new(ctx: Arc<AppContext>, session: ClientSession, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            session,
            shutdown,
        }
    }

    /// Drive the session to completion and emit its summary. Returns the
    /// final session state (used by tests and by callers that want the
    /// command count without re-parsing the audit stream).
    ///
    /// Sessions are never resumed: any I/O failure is a one-way trip to
    /// teardown, reported to the peer as nothing but a closed connection.
    pub async fn run<C: SessionChannel>(mut self, chan: &mut C) -> ClientSession {
        if !self.session.is_authenticated() {
            self.authenticate(chan).await;
        }
        if self.session.is_authenticated() {
            self.run_shell(chan).await;
        }
        chan.shutdown().await;
        self.finish()
    }

    /// Interactive login for transports with no built-in authentication.
    /// SSH sessions arrive already authenticated by the protocol adapter
    /// and skip this entirely.
    async fn authenticate<C: SessionChannel>(&mut self, chan: &mut C) {
        let banner = self.ctx.config.telnet.banner.clone();
        let login_timeout = Duration::from_secs(self.ctx.config.limits.login_timeout);
        let max_attempts = self.ctx.config.limits.max_auth_attempts;

        if send(chan, &format!("\r\n{}\r\n", banner)).await.is_err() {
            return;
        }
        if send(chan, "login: ").await.is_err() {
            return;
        }

        let shutdown = self.shutdown.clone();
        while !self.session.is_authenticated() && self.session.login_attempts < max_attempts {
            let username = match read_trimmed(chan, login_timeout, &shutdown).await {
                Some(line) if !line.is_empty() => line,
                _ => break,
            };
            if send(chan, "Password: ").await.is_err() {
                break;
            }
            let password = match read_trimmed(chan, login_timeout, &shutdown).await {
                Some(line) => line,
                None => break,
            };

            self.ctx.audit.log_auth_attempt(
                &self.session.session_id,
                self.session.peer_addr,
                self.session.protocol.as_str(),
                &username,
                &password,
            );

            if self.ctx.check_credentials(&username, &password) {
                self.session.authenticate(&username);
                self.ctx.audit.log_auth_success(
                    &self.session.session_id,
                    self.session.peer_addr,
                    self.session.protocol.as_str(),
                    &username,
                );
                info!(
                    session_id = %self.session.session_id,
                    ip = %self.session.peer_addr,
                    user = %username,
                    "Telnet login successful"
                );
                let _ = send(
                    chan,
                    &format!("\r\nWelcome to {}!\r\n", self.ctx.config.shell.hostname),
                )
                .await;
            } else {
                self.session.login_attempts += 1;
                self.ctx.audit.log_auth_failure(
                    &self.session.session_id,
                    self.session.peer_addr,
                    self.session.protocol.as_str(),
                    &username,
                    self.session.login_attempts,
                );
                info!(
                    session_id = %self.session.session_id,
                    ip = %self.session.peer_addr,
                    user = %username,
                    attempt = self.session.login_attempts,
                    "Telnet login failed"
                );
                if send(chan, "\r\nLogin incorrect\r\n").await.is_err() {
                    break;
                }
                if self.session.login_attempts < max_attempts
                    && send(chan, "login: ").await.is_err()
                {
                    break;
                }
            }
        }

        if !self.session.is_authenticated() {
            warn!(
                session_id = %self.session.session_id,
                ip = %self.session.peer_addr,
                attempts = self.session.login_attempts,
                "Login attempts exhausted, closing session"
            );
            let _ = send(chan, "\r\nToo many login attempts. Connection closed.\r\n").await;
        }
    }

    /// The shell loop: prompt, read with idle timeout, record, dispatch,
    /// reply. Runs only for authenticated sessions.
    async fn run_shell<C: SessionChannel>(&mut self, chan: &mut C) {
        let idle_secs = match self.session.protocol {
            crate::session::state::Protocol::Ssh => self.ctx.config.ssh.connection_timeout,
            crate::session::state::Protocol::Telnet => self.ctx.config.telnet.connection_timeout,
        };
        let idle_timeout = Duration::from_secs(idle_secs);
        let delay = Duration::from_millis(self.ctx.config.shell.command_delay_ms);
        let max_len = self.ctx.config.shell.max_command_length;

        // The engine only ever exists for an authenticated session.
        let engine = ShellEngine::new(
            self.ctx.config.shell.hostname.clone(),
            self.ctx.config.shell.home.clone(),
        );

        let last_login = chrono::Local::now().format("%a %b %d %H:%M:%S %Y");
        if send(chan, &format!("Last login: {}\r\n", last_login))
            .await
            .is_err()
        {
            return;
        }
        if send(chan, &engine.prompt(&self.session)).await.is_err() {
            return;
        }

        let shutdown = self.shutdown.clone();
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Ok(ReadEvent::Eof),
                event = chan.read_line(idle_timeout) => event,
            };
            let line = match event {
                Ok(ReadEvent::Line(line)) => line,
                Ok(ReadEvent::Eof) => {
                    debug!(session_id = %self.session.session_id, "Peer disconnected");
                    break;
                }
                Ok(ReadEvent::Timeout) => {
                    info!(
                        session_id = %self.session.session_id,
                        ip = %self.session.peer_addr,
                        "Session idle timeout"
                    );
                    break;
                }
                Err(e) => {
                    debug!(
                        session_id = %self.session.session_id,
                        error = %e,
                        "Read failed, closing session"
                    );
                    break;
                }
            };

            let line = truncate_to(line.trim(), max_len);
            if line.is_empty() {
                if send(chan, &engine.prompt(&self.session)).await.is_err() {
                    break;
                }
                continue;
            }

            // History inspection would otherwise record itself.
            if line != "history" {
                self.session.record_command(&line);
            }

            self.ctx.audit.log_command(
                &self.session.session_id,
                self.session.peer_addr,
                self.session.protocol.as_str(),
                self.session.username().unwrap_or(""),
                &line,
            );
            info!(
                session_id = %self.session.session_id,
                ip = %self.session.peer_addr,
                user = %self.session.username().unwrap_or(""),
                command = %line,
                "Command received"
            );

            // Imitate real command latency.
            tokio::time::sleep(delay).await;

            let reply = engine.execute(&mut self.session, &line);
            match reply.kind {
                ReplyKind::Exit => {
                    let _ = send(chan, "\r\nGoodbye!\r\n").await;
                    break;
                }
                ReplyKind::Dangerous => {
                    self.session.commands_executed += 1;
                    self.ctx.audit.log_dangerous_command(
                        &self.session.session_id,
                        self.session.peer_addr,
                        self.session.protocol.as_str(),
                        self.session.username().unwrap_or(""),
                        &line,
                    );
                    warn!(
                        session_id = %self.session.session_id,
                        ip = %self.session.peer_addr,
                        user = %self.session.username().unwrap_or(""),
                        command = %line,
                        "Dangerous command trapped"
                    );
                }
                ReplyKind::Normal => {
                    self.session.commands_executed += 1;
                }
            }

            if !reply.output.is_empty() {
                let body = reply.output.replace('\n', "\r\n");
                if send(chan, &format!("\r\n{}\r\n", body)).await.is_err() {
                    break;
                }
            }
            if send(chan, &engine.prompt(&self.session)).await.is_err() {
                break;
            }
        }
    }

    /// Emit the session summary and hand back the final state.
    fn finish(self) -> ClientSession {
        let duration = self.session.duration_secs();
        self.ctx.audit.log_session_summary(
            &self.session.session_id,
            self.session.peer_addr,
            self.session.protocol.as_str(),
            self.session.username(),
            duration,
            self.session.commands_executed,
            self.session.history_head(SUMMARY_COMMANDS),
        );
        info!(
            session_id = %self.session.session_id,
            ip = %self.session.peer_addr,
            user = %self.session.username().unwrap_or(""),
            duration = %format_duration(duration),
            commands = self.session.commands_executed,
            "Session ended"
        );
        self.session
    }
}

async fn send<C: SessionChannel>(chan: &mut C, text: &str) -> std::io::Result<()> {
    chan.write(text.as_bytes()).await
}

async fn read_trimmed<C: SessionChannel>(
    chan: &mut C,
    timeout: Duration,
    shutdown: &CancellationToken,
) -> Option<String> {
    let event = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return None,
        event = chan.read_line(timeout) => event,
    };
    match event {
        Ok(ReadEvent::Line(line)) => Some(line.trim().to_string()),
        _ => None,
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
fn truncate_to(line: &str, max: usize) -> String {
    if line.len() <= max {
        return line.to_string();
    }
    let mut end = max;
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    line[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_to("hello", 10), "hello");
        assert_eq!(truncate_to("hello", 3), "hel");
        // 'é' is two bytes; cutting inside it must back off.
        assert_eq!(truncate_to("héllo", 2), "h");
    }
}
