//! Error taxonomy for the session engine.

use thiserror::Error;

/// Errors produced by the anytalk session engine.
#[derive(Debug, Error)]
pub enum AnytalkError {
    /// The audio capture device was unavailable at `start()`.
    #[error("audio device unavailable")]
    DeviceUnavailable,

    /// DNS resolution, TCP connect, or TLS handshake failed while dialing
    /// the remote service. TLS and WebSocket-handshake failures are
    /// constructed as their own variants below and collapsed into this
    /// one kind by the caller, per §7 ("surfaced as dial-failure").
    #[error("dial failed: {0}")]
    DialFailure(String),

    /// TLS handshake or I/O failure.
    #[error("tls failure: {0}")]
    TlsFailure(String),

    /// The WebSocket upgrade handshake did not complete (no `HTTP/1.1
    /// 101` status line, or the peer closed before responding).
    #[error("websocket handshake failed: {0}")]
    HandshakeFailure(String),

    /// A malformed frame, unexpected opcode, or oversized payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer closed the connection (read returned 0, or a `close`
    /// frame was received).
    #[error("connection closed")]
    ConnectionClosed,

    /// A `read` timed out; distinct from `ConnectionClosed` per §4.1.
    #[error("operation would block")]
    WouldBlock,

    /// Underlying I/O failure not otherwise classified above.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnytalkError {
    /// True if the underlying `std::io::Error` this was built from (if
    /// any) represents a read timeout rather than a hard failure.
    pub(crate) fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Self::WouldBlock,
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
                Self::ConnectionClosed
            }
            _ => Self::Io(err),
        }
    }
}

/// Result type alias for anytalk operations.
pub type Result<T> = std::result::Result<T, AnytalkError>;
