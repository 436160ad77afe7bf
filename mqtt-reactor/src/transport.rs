use std::io;
use std::net::SocketAddr;

use crate::selector::Token;

/// Progress report from a transport-layer handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// The handshake completed.
    Done,
    /// The handshake needs the transport to become readable.
    WantRead,
    /// The handshake needs the transport to become writable.
    WantWrite,
}

/// Non-blocking byte transport, exclusively owned by the reactor while
/// active.
///
/// `send` and `recv` must never block; `io::ErrorKind::WouldBlock` reports
/// that the operation cannot make progress right now.
pub trait Transport {
    /// Identity under which the host selector knows this transport.
    fn token(&self) -> Token;

    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// The outcome of a pending non-blocking connect (`SO_ERROR`).
    fn take_error(&mut self) -> io::Result<Option<io::Error>>;

    /// Half-closes the local write side.
    fn shutdown_write(&mut self) -> io::Result<()>;

    /// True when the transport requires a handshake step (e.g. TLS) after
    /// the connect completes, before application bytes may flow.
    fn needs_handshake(&self) -> bool {
        false
    }

    /// Drives the handshake one step.
    fn handshake(&mut self) -> io::Result<HandshakeStatus> {
        Ok(HandshakeStatus::Done)
    }
}

/// Outcome of a non-blocking connect attempt.
pub enum ConnectStatus {
    /// The transport connected synchronously.
    Ready(Box<dyn Transport>),
    /// The connect was issued and will complete when the transport becomes
    /// writable.
    InProgress(Box<dyn Transport>),
}

/// Produces non-blocking transport handles.
pub trait SocketFactory {
    fn connect(&mut self, addr: &SocketAddr) -> io::Result<ConnectStatus>;
}

/// Pending name-resolution result.
///
/// The reactor polls the future it owns; once `poll` returns `Some` the
/// future is dropped.  Cancellation is best-effort: a future completing
/// after `cancel` is simply never polled again.
pub trait ResolutionFuture {
    fn poll(&mut self) -> Option<io::Result<Vec<SocketAddr>>>;

    fn cancel(&mut self) {}
}

/// Asynchronous name resolver.
pub trait NameResolver {
    fn resolve(&mut self, host: &str, port: u16) -> Box<dyn ResolutionFuture>;
}
