//! Events delivered to the embedding host.

use std::sync::Arc;

/// A coarse session status string delivered via [`Event::Status`].
pub mod status {
    /// Dialing (no pre-warmed connection was available).
    pub const CONNECTING: &str = "connecting";
    /// A session is actively streaming audio.
    pub const RECORDING: &str = "recording";
    /// No session is active; the terminal state of every session.
    pub const IDLE: &str = "idle";
}

/// One event in a session's (or the context's) event stream. Events for
/// a single session are always delivered in production order; no
/// reordering across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A revisable transcription preview.
    Partial(String),
    /// A stable transcription segment the host may commit.
    Final(String),
    /// A coarse status string; see [`status`].
    Status(String),
    /// A short human-readable error message.
    Error(String),
}

/// The callback the host registers at init. May be invoked from the
/// session worker thread or the context's own threads; hosts that need
/// UI-thread dispatch must marshal internally.
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;
