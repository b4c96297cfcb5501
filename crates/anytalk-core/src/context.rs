//! Top-level coordinator: owns capture, pool, and session lifecycle;
//! synchronizes start/stop/cancel from arbitrary host threads.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::capture::AudioCapture;
use crate::config::Config;
use crate::event::{status, Event, EventCallback};
use crate::pool::{self, ConnectionPool};
use crate::session::Session;
use crate::target::AudioTarget;

#[derive(Default)]
struct ContextState {
    active: Option<Arc<Session>>,
    draining: Option<Arc<Session>>,
    drain_thread: Option<JoinHandle<()>>,
}

/// The embedding host's single handle onto the engine. Always used
/// behind an `Arc` so the drain-wait thread can outlive the call that
/// spawned it.
pub struct Context {
    config: Config,
    callback: EventCallback,
    target: Arc<AudioTarget>,
    capture: AudioCapture,
    pool: ConnectionPool,
    state: Mutex<ContextState>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Context {
    /// Start audio capture (best-effort) and the connection pool, and
    /// return a ready-to-use handle.
    #[must_use]
    pub fn init(config: Config, callback: EventCallback) -> Arc<Self> {
        let target = Arc::new(AudioTarget::new());
        let capture = AudioCapture::new(Arc::clone(&target));
        if let Err(e) = capture.start() {
            tracing::warn!(error = %e, "audio capture unavailable at init");
        }

        let pool = ConnectionPool::new(config.clone());
        pool.start();

        Arc::new(Self {
            config,
            callback,
            target,
            capture,
            pool,
            state: Mutex::new(ContextState::default()),
        })
    }

    /// Start a new session, replacing any existing active one. Emits
    /// `connecting` on an on-demand dial and `recording` once the
    /// session is live, or an error event if dialing fails.
    pub fn start_session(self: &Arc<Self>) {
        self.abort_draining();

        if let Err(e) = self.capture.start() {
            tracing::debug!(error = %e, "audio capture still unavailable");
        }

        let mut state = self.state.lock().expect("context mutex poisoned");
        let previous = state.active.take();
        drop(state);
        if let Some(active) = previous {
            active.cancel();
            active.join();
        }

        // No I/O and no host callback runs while `state` is held: a
        // dial can take seconds, and a host that reacts to `connecting`
        // or `error` by calling back into `stop`/`cancel` would re-lock
        // this non-reentrant mutex and deadlock.
        let ws = match self.pool.take() {
            Some(ws) => ws,
            None => {
                (self.callback)(Event::Status(status::CONNECTING.to_string()));
                match pool::dial(&self.config) {
                    Ok(ws) => ws,
                    Err(e) => {
                        tracing::warn!(error = %e, "on-demand dial failed");
                        (self.callback)(Event::Error("connection failed".to_string()));
                        return;
                    }
                }
            }
        };

        let session = Arc::new(Session::new(Arc::clone(&self.target)));
        session.start(ws, self.config.mode(), Arc::clone(&self.callback));
        self.state.lock().expect("context mutex poisoned").active = Some(session);
        (self.callback)(Event::Status(status::RECORDING.to_string()));
    }

    /// Stop gracefully: detach audio and let the session drain until
    /// the server's terminal response, reaped by a background thread.
    /// Emits `idle` immediately if no session was active.
    pub fn stop_session(self: &Arc<Self>) {
        self.abort_draining();

        let mut state = self.state.lock().expect("context mutex poisoned");
        let Some(active) = state.active.take() else {
            drop(state);
            (self.callback)(Event::Status(status::IDLE.to_string()));
            return;
        };

        active.stop_audio();
        state.draining = Some(Arc::clone(&active));

        let ctx = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("anytalk-drain-wait".to_string())
            .spawn(move || drain_wait_main(&ctx, &active))
            .expect("failed to spawn drain-wait thread");
        state.drain_thread = Some(handle);
    }

    /// Abort immediately: cancel and join the active session (if any)
    /// and any still-draining one, then emit `idle`.
    pub fn cancel(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("context mutex poisoned");
        let active = state.active.take();
        drop(state);
        if let Some(active) = active {
            active.cancel();
            active.join();
        }

        self.abort_draining();
        (self.callback)(Event::Status(status::IDLE.to_string()));
    }

    /// Cancel, then stop the pool and audio capture. Idempotent.
    pub fn destroy(self: &Arc<Self>) {
        self.cancel();
        self.pool.stop();
        self.capture.stop();
    }

    fn abort_draining(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("context mutex poisoned");
        let Some(draining) = state.draining.take() else {
            return;
        };
        draining.cancel();
        if let Some(handle) = state.drain_thread.take() {
            drop(state);
            let _ = handle.join();
        }
    }
}

fn drain_wait_main(ctx: &Arc<Context>, session: &Arc<Session>) {
    session.join();
    let mut state = ctx.state.lock().expect("context mutex poisoned");
    let still_ours = state.draining.as_ref().is_some_and(|s| Arc::ptr_eq(s, session));
    if still_ours {
        state.draining = None;
        state.drain_thread = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback() -> (EventCallback, Arc<AtomicUsize>) {
        let idle_count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&idle_count);
        let callback: EventCallback = Arc::new(move |event| {
            if event == Event::Status(status::IDLE.to_string()) {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        });
        (callback, idle_count)
    }

    #[test]
    fn stop_with_no_active_session_emits_idle_exactly_once() {
        let (callback, idle_count) = counting_callback();
        let ctx = Context::init(Config::new(), callback);
        ctx.stop_session();
        assert_eq!(idle_count.load(Ordering::SeqCst), 1);
        ctx.destroy();
    }

    #[test]
    fn cancel_with_no_active_session_emits_idle_exactly_once() {
        let (callback, idle_count) = counting_callback();
        let ctx = Context::init(Config::new(), callback);
        ctx.cancel();
        assert_eq!(idle_count.load(Ordering::SeqCst), 1);
        ctx.destroy();
    }

    #[test]
    fn destroy_is_idempotent() {
        let (callback, _idle_count) = counting_callback();
        let ctx = Context::init(Config::new(), callback);
        ctx.destroy();
        ctx.destroy();
    }
}
