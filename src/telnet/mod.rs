use crate::context::AppContext;
use crate::session::channel::{ReadEvent, SessionChannel};
use crate::session::state::{ClientSession, Protocol};
use crate::session::SessionMachine;
use crate::utils::generate_session_id;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Cap on a single input line; a peer streaming bytes without a newline
/// gets chopped here instead of growing the buffer.
const MAX_LINE_BYTES: u64 = 4096;

/// Blocking-read side of the channel contract: Telnet hands us a plain
/// byte stream, so a buffered line read is all the adaptation needed.
pub struct TelnetChannel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TelnetChannel {
    pub fn new(read_half: OwnedReadHalf, write_half: OwnedWriteHalf) -> Self {
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }
}

impl SessionChannel for TelnetChannel {
    async fn read_line(&mut self, timeout: Duration) -> std::io::Result<ReadEvent> {
        let mut buf = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_LINE_BYTES);
        match tokio::time::timeout(timeout, limited.read_until(b'\n', &mut buf)).await {
            Err(_) => Ok(ReadEvent::Timeout),
            Ok(Ok(0)) => Ok(ReadEvent::Eof),
            Ok(Ok(_)) => {
                let cleaned = strip_telnet_commands(&buf);
                let line = String::from_utf8_lossy(&cleaned)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                Ok(ReadEvent::Line(line))
            }
            Ok(Err(e)) => Err(e),
        }
    }

    async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!(error = %e, "Telnet socket close failed");
        }
    }
}

/// Strip IAC command sequences from raw telnet input. We never negotiate
/// options; whatever the client proposes is silently discarded.
fn strip_telnet_commands(input: &[u8]) -> Vec<u8> {
    const IAC: u8 = 255;
    const SB: u8 = 250;
    const SE: u8 = 240;

    let mut output = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != IAC {
            output.push(input[i]);
            i += 1;
            continue;
        }
        match input.get(i + 1) {
            // Escaped literal 0xFF
            Some(&IAC) => {
                output.push(IAC);
                i += 2;
            }
            // Subnegotiation: skip through IAC SE
            Some(&SB) => {
                i += 2;
                while i < input.len() {
                    if input[i] == IAC && input.get(i + 1) == Some(&SE) {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            // WILL/WONT/DO/DONT carry an option byte
            Some(&cmd) if (251..=254).contains(&cmd) => {
                i += 3;
            }
            Some(_) => {
                i += 2;
            }
            None => {
                i += 1;
            }
        }
    }
    output
}

/// Accept loop for the Telnet listener. Admission runs on the raw socket;
/// accepted connections get a session task that drives the interactive
/// login and shell through the shared machine.
pub async fn start_telnet_server(ctx: Arc<AppContext>, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(&ctx.config.telnet.listen).await?;
    info!(addr = %ctx.config.telnet.listen, "Telnet listener ready");

    let semaphore = Arc::new(Semaphore::new(ctx.config.telnet.max_connections as usize));
    let sessions = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "Telnet accept error");
                        continue;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("Telnet listener shutting down (no new connections)");
                break;
            }
        };

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(ip = %peer.ip(), "Telnet listener at capacity, dropping connection");
                drop(stream);
                continue;
            }
        };

        let ip = peer.ip();
        if let Err(reason) = ctx.admission.try_admit(ip) {
            warn!(ip = %ip, reason = %reason, "Telnet connection rejected");
            ctx.audit
                .log_admission_rejected(ip, Protocol::Telnet.as_str(), reason.as_str());
            drop(stream);
            continue;
        }

        let session_id = generate_session_id();
        ctx.audit
            .log_connection_new(&session_id, ip, Protocol::Telnet.as_str());
        info!(ip = %ip, session_id = %session_id, "New Telnet connection");

        let ctx = ctx.clone();
        let shutdown = shutdown.clone();
        sessions.spawn(async move {
            let _permit = permit;
            let (read_half, write_half) = stream.into_split();
            let mut chan = TelnetChannel::new(read_half, write_half);

            let client = ClientSession::new(
                session_id.clone(),
                ip,
                Protocol::Telnet,
                &ctx.config.shell.home,
            );
            let machine = SessionMachine::new(ctx.clone(), client, shutdown);
            machine.run(&mut chan).await;

            ctx.audit
                .log_connection_closed(&session_id, ip, Protocol::Telnet.as_str());
            ctx.admission.release(ip);
        });
    }

    sessions.close();
    sessions.wait().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bytes_pass_through() {
        assert_eq!(strip_telnet_commands(b"ls -la\r\n"), b"ls -la\r\n");
    }

    #[test]
    fn escaped_iac_becomes_literal() {
        assert_eq!(strip_telnet_commands(&[0xFF, 0xFF, b'x']), vec![0xFF, b'x']);
    }

    #[test]
    fn will_wont_do_dont_are_dropped() {
        // IAC DO ECHO, then payload
        let input = [0xFF, 253, 1, b'l', b's'];
        assert_eq!(strip_telnet_commands(&input), b"ls");
    }

    #[test]
    fn subnegotiation_is_dropped() {
        // IAC SB NAWS ... IAC SE surrounding payload
        let input = [b'a', 0xFF, 250, 31, 0, 80, 0, 24, 0xFF, 240, b'b'];
        assert_eq!(strip_telnet_commands(&input), b"ab");
    }

    #[test]
    fn truncated_sequence_does_not_panic() {
        assert_eq!(strip_telnet_commands(&[0xFF]), Vec::<u8>::new());
        assert_eq!(strip_telnet_commands(&[0xFF, 253]), Vec::<u8>::new());
    }
}
