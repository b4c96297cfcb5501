//! Per-session worker: sends the initial request, pumps audio from the
//! ring, reads responses, and dispatches events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::json;

use crate::codec::{decode, encode_audio_only, encode_full_client_request, Decoded};
use crate::config::Mode;
use crate::error::AnytalkError;
use crate::event::{status, Event, EventCallback};
use crate::interpreter::InterpreterState;
use crate::ring::AudioRing;
use crate::target::AudioTarget;
use crate::websocket::{Opcode, WebSocket};

const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// A running (or just-finished) ASR session. Owns its WebSocket and
/// audio ring; holds a non-owning reference to the [`AudioTarget`] the
/// capture thread feeds.
pub(crate) struct Session {
    ring: Arc<AudioRing>,
    target: Arc<AudioTarget>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl Session {
    /// A not-yet-started session bound to the given (Context-owned)
    /// audio target.
    #[must_use]
    pub(crate) fn new(target: Arc<AudioTarget>) -> Self {
        Self {
            ring: Arc::new(AudioRing::new()),
            target,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Register this session's ring as the capture sink and spawn the
    /// worker thread, which takes ownership of `ws`.
    pub(crate) fn start(&self, ws: WebSocket, mode: Mode, callback: EventCallback) {
        self.target.set(Arc::clone(&self.ring));
        self.running.store(true, Ordering::SeqCst);

        let ring = Arc::clone(&self.ring);
        let target = Arc::clone(&self.target);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("anytalk-session".to_string())
            .spawn(move || worker_main(ws, &ring, &target, &running, mode, &callback))
            .expect("failed to spawn session worker thread");
        *self.worker.lock().expect("session mutex poisoned") = Some(handle);
    }

    /// Detach from the audio sink without aborting: the worker sends a
    /// terminal audio marker once the ring drains and keeps reading
    /// until the server's terminal response (or a transport failure).
    pub(crate) fn stop_audio(&self) {
        self.target.clear();
    }

    /// Abort immediately: stop pumping audio and ask the worker to exit
    /// at its next read-timeout check.
    pub(crate) fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.target.clear();
    }

    /// Block until the worker thread has exited.
    pub(crate) fn join(&self) {
        if let Some(handle) = self.worker.lock().expect("session mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel();
        self.join();
    }
}

fn initial_request_json(mode: Mode) -> Vec<u8> {
    let mut audio = json!({
        "format": "pcm",
        "rate": 16000,
        "bits": 16,
        "channel": 1,
    });
    if mode == Mode::NoStream {
        audio["language"] = json!("zh-CN");
    }
    let body = json!({
        "user": {"uid": "anytalk"},
        "audio": audio,
        "request": {
            "model_name": "bigmodel",
            "enable_itn": true,
            "enable_punc": true,
            "enable_ddc": false,
            "enable_word": false,
            "res_type": "full",
            "nbest": 1,
            "use_vad": true,
        },
    });
    serde_json::to_vec(&body).expect("fixed JSON shape always serializes")
}

fn worker_main(
    mut ws: WebSocket,
    ring: &AudioRing,
    target: &AudioTarget,
    running: &AtomicBool,
    mode: Mode,
    callback: &EventCallback,
) {
    if let Err(e) = ws.set_read_timeout(Some(READ_TIMEOUT)) {
        tracing::warn!(error = %e, "failed to configure session read timeout");
        callback(Event::Status(status::IDLE.to_string()));
        return;
    }

    let initial = initial_request_json(mode);
    if ws.send_binary(&encode_full_client_request(&initial)).is_err() {
        tracing::warn!("failed to send initial request");
    }

    let mut audio_done = false;
    let mut interpreter = InterpreterState::new();

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        if !audio_done {
            if let Some(chunk) = ring.pop() {
                if ws.send_binary(&encode_audio_only(&chunk, false)).is_err() {
                    // The server may still deliver finals for audio already sent.
                    audio_done = true;
                }
            } else if !target.is_active() {
                let _ = ws.send_binary(&encode_audio_only(&[], true));
                audio_done = true;
            }
        }

        match ws.read_frame() {
            Err(AnytalkError::WouldBlock) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "session read failed, ending session");
                break;
            }
            Ok(frame) => match frame.opcode {
                Opcode::Close => break,
                Opcode::Ping => {
                    let _ = ws.send_pong(&frame.payload);
                }
                Opcode::Binary => match decode(&frame.payload) {
                    Ok(Decoded::Error { code, message }) => {
                        tracing::warn!(code, %message, "server sent an error frame");
                        callback(Event::Error(message));
                        break;
                    }
                    Ok(Decoded::Response { json, terminal }) => {
                        let events = interpreter.interpret(&json, mode);
                        if let Some(partial) = events.partial {
                            callback(Event::Partial(partial));
                        }
                        for text in events.finals {
                            callback(Event::Final(text));
                        }
                        if terminal {
                            break;
                        }
                    }
                    Ok(Decoded::Unknown) => {}
                    Err(e) => tracing::warn!(error = %e, "dropping malformed vendor frame"),
                },
                Opcode::Text | Opcode::Continuation | Opcode::Pong => {}
            },
        }
    }

    ws.close();
    callback(Event::Status(status::IDLE.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_request_carries_language_only_in_nostream_mode() {
        let bidi = initial_request_json(Mode::Bidi);
        let value: serde_json::Value = serde_json::from_slice(&bidi).unwrap();
        assert!(value["audio"].get("language").is_none());

        let nostream = initial_request_json(Mode::NoStream);
        let value: serde_json::Value = serde_json::from_slice(&nostream).unwrap();
        assert_eq!(value["audio"]["language"], "zh-CN");
    }

    #[test]
    fn new_session_is_not_running() {
        let session = Session::new(Arc::new(AudioTarget::new()));
        assert!(!session.running.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_before_start_clears_target_and_is_harmless() {
        let target = Arc::new(AudioTarget::new());
        let session = Session::new(Arc::clone(&target));
        session.cancel();
        session.join();
        assert!(!target.is_active());
    }
}
