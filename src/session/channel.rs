use std::time::Duration;

/// Outcome of a line read on a session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Line(String),
    Eof,
    Timeout,
}

/// One duplex, line-oriented capability per session.
///
/// The two transports deliver input with opposite I/O models: russh pushes
/// bytes through handler callbacks, Telnet hands us a readable stream. Both
/// are reconciled here, at the adapter boundary, so the session state
/// machine is written exactly once against this trait.
pub trait SessionChannel: Send {
    /// Read the next complete line, waiting at most `timeout`. Lines are
    /// delivered without their trailing newline.
    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> impl std::future::Future<Output = std::io::Result<ReadEvent>> + Send;

    /// Write raw bytes to the peer.
    fn write(&mut self, data: &[u8]) -> impl std::future::Future<Output = std::io::Result<()>> + Send;

    /// Close is best-effort: failures during teardown are logged at low
    /// severity by implementations and never retried or escalated.
    fn shutdown(&mut self) -> impl std::future::Future<Output = ()> + Send;
}
