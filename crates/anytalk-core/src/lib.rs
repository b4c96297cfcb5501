//! Voice-input session engine: a pre-warmed TLS/WebSocket connection
//! pool, a continuous microphone capture pipeline, and a per-session
//! state machine that speaks a vendor binary ASR protocol and turns its
//! responses into an ordered stream of partial/final transcription
//! events.
//!
//! [`Context`] is the single entry point: `Context::init` starts audio
//! capture and the connection pool, then `start_session` /
//! `stop_session` / `cancel` drive one ASR session at a time. This
//! crate never installs a global `tracing` subscriber or logger; the
//! embedding binary owns that.

mod capture;
mod codec;
mod config;
mod context;
mod error;
mod event;
mod interpreter;
mod pool;
mod ring;
mod session;
mod target;
mod tls;
mod websocket;

pub use config::{Config, Mode};
pub use context::Context;
pub use error::{AnytalkError, Result};
pub use event::{status, Event, EventCallback};
