use crate::context::AppContext;
use crate::session::channel::{ReadEvent, SessionChannel};
use crate::session::state::{ClientSession, Protocol};
use crate::session::SessionMachine;
use crate::shell::{ReplyKind, ShellEngine};
use crate::ssh::terminal::TerminalState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use russh::server::{Auth, Msg, Session};
use russh::{ChannelId, CryptoVec, MethodKind, MethodSet};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Maximum number of shell channels per SSH connection to prevent resource exhaustion.
pub const MAX_CHANNELS_PER_CONNECTION: usize = 10;

/// Queue depth between the byte-level callbacks and the line-level session
/// machine. A peer pasting faster than the machine drains simply loses lines.
const LINE_QUEUE_CAPACITY: usize = 64;

struct ChannelState {
    terminal: TerminalState,
    line_tx: mpsc::Sender<String>,
    /// Receiver parked here between channel open and shell_request, when the
    /// session machine takes it.
    pending_rx: Option<mpsc::Receiver<String>>,
    /// Kept alive by RAII; dropping it would close the SSH channel.
    _channel: russh::Channel<Msg>,
}

/// Line-queue side of an SSH shell channel: russh delivers bytes through
/// callbacks, the handler assembles them into lines, and the session machine
/// reads them here as if the transport were a blocking line stream.
pub struct SshLineChannel {
    rx: mpsc::Receiver<String>,
    handle: russh::server::Handle,
    id: ChannelId,
}

impl SessionChannel for SshLineChannel {
    async fn read_line(&mut self, timeout: Duration) -> std::io::Result<ReadEvent> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Ok(ReadEvent::Timeout),
            Ok(None) => Ok(ReadEvent::Eof),
            Ok(Some(line)) => Ok(ReadEvent::Line(line)),
        }
    }

    async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.handle
            .data(self.id, CryptoVec::from_slice(data))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }

    async fn shutdown(&mut self) {
        if self.handle.close(self.id).await.is_err() {
            debug!("SSH channel close failed (already gone)");
        }
    }
}

/// Per-connection SSH handler. russh performs the wire protocol; this type
/// answers its auth and channel callbacks against the bait credential table
/// and feeds accepted shells into the shared session machine.
pub struct SshHandler {
    ctx: Arc<AppContext>,
    peer_addr: SocketAddr,
    session_id: String,
    authenticated: bool,
    username: Option<String>,
    auth_attempts: u32,
    channels: DashMap<ChannelId, ChannelState>,
    machines: TaskTracker,
    shutdown: CancellationToken,
}

impl SshHandler {
    pub fn new(
        ctx: Arc<AppContext>,
        peer_addr: SocketAddr,
        session_id: String,
        machines: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            peer_addr,
            session_id,
            authenticated: false,
            username: None,
            auth_attempts: 0,
            channels: DashMap::new(),
            machines,
            shutdown,
        }
    }

    fn record_auth_failure(&self, username: &str) -> Auth {
        self.ctx.audit.log_auth_failure(
            &self.session_id,
            self.peer_addr.ip(),
            Protocol::Ssh.as_str(),
            username,
            self.auth_attempts,
        );
        info!(
            session_id = %self.session_id,
            ip = %self.peer_addr.ip(),
            user = %username,
            attempt = self.auth_attempts,
            "SSH login failed"
        );

        if self.auth_attempts >= self.ctx.config.limits.max_auth_attempts {
            warn!(
                session_id = %self.session_id,
                ip = %self.peer_addr.ip(),
                "Login attempts exhausted, closing session"
            );
            return Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            };
        }

        Auth::Reject {
            proceed_with_methods: Some(MethodSet::from([MethodKind::Password].as_slice())),
            partial_success: false,
        }
    }
}

impl russh::server::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        debug!(
            session_id = %self.session_id,
            ip = %self.peer_addr.ip(),
            user = %user,
            "auth_none attempt"
        );
        Ok(Auth::Reject {
            proceed_with_methods: Some(MethodSet::from([MethodKind::Password].as_slice())),
            partial_success: false,
        })
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.auth_attempts += 1;

        self.ctx.audit.log_auth_attempt(
            &self.session_id,
            self.peer_addr.ip(),
            Protocol::Ssh.as_str(),
            user,
            password,
        );

        if self.ctx.check_credentials(user, password) {
            self.authenticated = true;
            self.username = Some(user.to_string());
            self.ctx.audit.log_auth_success(
                &self.session_id,
                self.peer_addr.ip(),
                Protocol::Ssh.as_str(),
                user,
            );
            info!(
                session_id = %self.session_id,
                ip = %self.peer_addr.ip(),
                user = %user,
                "SSH login successful"
            );
            Ok(Auth::Accept)
        } else {
            Ok(self.record_auth_failure(user))
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: russh::Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if !self.authenticated {
            return Ok(false);
        }
        if self.channels.len() >= MAX_CHANNELS_PER_CONNECTION {
            warn!(
                session_id = %self.session_id,
                ip = %self.peer_addr.ip(),
                max = MAX_CHANNELS_PER_CONNECTION,
                "Max shell channels per connection exceeded"
            );
            return Ok(false);
        }

        let (line_tx, line_rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
        let channel_id = channel.id();
        self.channels.insert(
            channel_id,
            ChannelState {
                terminal: TerminalState::new(),
                line_tx,
                pending_rx: Some(line_rx),
                _channel: channel,
            },
        );
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let _ = session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.authenticated {
            return Ok(());
        }
        let username = match &self.username {
            Some(u) => u.clone(),
            None => return Ok(()),
        };

        let rx = match self.channels.get_mut(&channel) {
            Some(mut state) => state.pending_rx.take(),
            None => None,
        };
        let Some(rx) = rx else {
            // No channel state or shell already running on this channel.
            return Ok(());
        };

        let mut client = ClientSession::new(
            self.session_id.clone(),
            self.peer_addr.ip(),
            Protocol::Ssh,
            &self.ctx.config.shell.home,
        );
        client.authenticate(&username);

        let machine = SessionMachine::new(self.ctx.clone(), client, self.shutdown.clone());
        let mut chan = SshLineChannel {
            rx,
            handle: session.handle(),
            id: channel,
        };
        self.machines.spawn(async move {
            machine.run(&mut chan).await;
        });
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.authenticated {
            return Ok(());
        }

        let mut saw_eof = false;
        {
            let Some(mut state) = self.channels.get_mut(&channel) else {
                return Ok(());
            };
            for &byte in data {
                // Ctrl-D on an empty line is end-of-input.
                if byte == 0x04 && state.terminal.buffer_is_empty() {
                    saw_eof = true;
                    break;
                }
                let (echo, completed_line) = state.terminal.process_byte(byte);
                if !echo.is_empty() {
                    let _ = session.data(channel, CryptoVec::from_slice(&echo));
                }
                if let Some(line) = completed_line {
                    if state.line_tx.try_send(line).is_err() {
                        debug!(
                            session_id = %self.session_id,
                            "Line queue full or closed, dropping input"
                        );
                    }
                }
            }
        }
        if saw_eof {
            // Dropping the channel state drops the sender; the session
            // machine observes Eof and runs its teardown.
            self.channels.remove(&channel);
        }
        Ok(())
    }

    /// Handle `ssh user@host "command"` style invocations: one-shot dispatch
    /// through the same shell engine, then close with exit status 0.
    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if !self.authenticated {
            let _ = session.channel_failure(channel);
            return Ok(());
        }
        if data.len() > 4096 {
            warn!(
                session_id = %self.session_id,
                data_len = data.len(),
                "exec_request data too large, rejecting"
            );
            let _ = session.channel_failure(channel);
            return Ok(());
        }
        let username = match &self.username {
            Some(u) => u.clone(),
            None => {
                let _ = session.channel_failure(channel);
                return Ok(());
            }
        };

        let command = String::from_utf8_lossy(data).trim().to_string();
        self.ctx.audit.log_command(
            &self.session_id,
            self.peer_addr.ip(),
            Protocol::Ssh.as_str(),
            &username,
            &command,
        );
        info!(
            session_id = %self.session_id,
            ip = %self.peer_addr.ip(),
            user = %username,
            command = %command,
            "Command received (exec)"
        );

        tokio::time::sleep(Duration::from_millis(self.ctx.config.shell.command_delay_ms)).await;

        let engine = ShellEngine::new(
            self.ctx.config.shell.hostname.clone(),
            self.ctx.config.shell.home.clone(),
        );
        let mut one_shot = ClientSession::new(
            self.session_id.clone(),
            self.peer_addr.ip(),
            Protocol::Ssh,
            &self.ctx.config.shell.home,
        );
        one_shot.authenticate(&username);
        let reply = engine.execute(&mut one_shot, &command);

        if reply.kind == ReplyKind::Dangerous {
            self.ctx.audit.log_dangerous_command(
                &self.session_id,
                self.peer_addr.ip(),
                Protocol::Ssh.as_str(),
                &username,
                &command,
            );
            warn!(
                session_id = %self.session_id,
                ip = %self.peer_addr.ip(),
                user = %username,
                command = %command,
                "Dangerous command trapped (exec)"
            );
        }

        if !reply.output.is_empty() {
            let body = format!("{}\r\n", reply.output.replace('\n', "\r\n"));
            let _ = session.data(channel, CryptoVec::from_slice(body.as_bytes()));
        }
        let _ = session.exit_status_request(channel, 0);
        let _ = session.close(channel);
        Ok(())
    }

    /// No subsystems here: SFTP and friends would promise file transfer the
    /// virtual tree cannot deliver.
    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        warn!(
            session_id = %self.session_id,
            ip = %self.peer_addr.ip(),
            subsystem = %name,
            user = ?self.username,
            "Subsystem denied"
        );
        let _ = session.channel_failure(channel);
        Ok(())
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: russh::Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        warn!(
            session_id = %self.session_id,
            ip = %self.peer_addr.ip(),
            target = %format!("{}:{}", host_to_connect, port_to_connect),
            user = ?self.username,
            "Forwarding denied (direct-tcpip)"
        );
        drop(channel);
        Ok(false)
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        warn!(
            session_id = %self.session_id,
            ip = %self.peer_addr.ip(),
            address = %address,
            port = %port,
            user = ?self.username,
            "Reverse forwarding denied (tcpip_forward)"
        );
        Ok(false)
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }
}
