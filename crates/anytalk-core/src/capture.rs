//! Continuous microphone capture.
//!
//! `cpal::Stream` is not guaranteed `Send`, so, using the same
//! discipline `gglib-voice::audio_thread` uses to isolate `cpal` from
//! the rest of an async runtime, the stream is built and kept alive
//! entirely on a dedicated OS thread; callers only ever see
//! [`AudioCapture::start`] and [`AudioCapture::stop`].

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;

use crate::error::{AnytalkError, Result};
use crate::ring::{AudioChunk, CHUNK_BYTES};
use crate::target::AudioTarget;

const SAMPLE_RATE: u32 = 16_000;
const CHANNELS: u16 = 1;
const CHUNK_SAMPLES: usize = CHUNK_BYTES / 2;

enum CaptureCommand {
    Stop,
}

/// Owns the capture thread's lifetime. `start`/`stop` are idempotent
/// (both no-ops when already in the target state).
pub(crate) struct AudioCapture {
    target: Arc<AudioTarget>,
    cmd_tx: Mutex<Option<mpsc::Sender<CaptureCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AudioCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCapture")
            .field("running", &self.thread.lock().expect("capture mutex poisoned").is_some())
            .finish()
    }
}

impl AudioCapture {
    /// Bind to `target`; does not open the device until [`start`](Self::start).
    #[must_use]
    pub(crate) fn new(target: Arc<AudioTarget>) -> Self {
        Self {
            target,
            cmd_tx: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    /// Open the default input device at 16 kHz mono S16LE and start
    /// streaming fixed-size chunks to the bound [`AudioTarget`].
    /// Idempotent. If the device is unavailable, returns
    /// `AnytalkError::DeviceUnavailable`; the rest of the system keeps
    /// running and a later `start()` may succeed.
    pub(crate) fn start(&self) -> Result<()> {
        let mut thread_guard = self.thread.lock().expect("capture mutex poisoned");
        if thread_guard.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<CaptureCommand>();
        let target = Arc::clone(&self.target);

        let handle = thread::Builder::new()
            .name("anytalk-capture".to_string())
            .spawn(move || capture_thread_main(target, cmd_rx, ready_tx))
            .expect("failed to spawn audio capture thread");

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *thread_guard = Some(handle);
                *self.cmd_tx.lock().expect("capture mutex poisoned") = Some(cmd_tx);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AnytalkError::DeviceUnavailable)
            }
        }
    }

    /// Stop the capture thread, if running. Idempotent.
    pub(crate) fn stop(&self) {
        let mut thread_guard = self.thread.lock().expect("capture mutex poisoned");
        let Some(handle) = thread_guard.take() else {
            return;
        };
        if let Some(tx) = self.cmd_tx.lock().expect("capture mutex poisoned").take() {
            let _ = tx.send(CaptureCommand::Stop);
        }
        let _ = handle.join();
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread_main(
    target: Arc<AudioTarget>,
    cmd_rx: mpsc::Receiver<CaptureCommand>,
    ready_tx: mpsc::Sender<Result<()>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err(AnytalkError::DeviceUnavailable));
        return;
    };

    let config = StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Fixed(CHUNK_SAMPLES as u32),
    };

    let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_BYTES * 2);
    let cb_target = Arc::clone(&target);

    let stream = device.build_input_stream(
        &config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            for sample in data {
                pending.extend_from_slice(&sample.to_le_bytes());
            }
            while pending.len() >= CHUNK_BYTES {
                let mut chunk: AudioChunk = [0u8; CHUNK_BYTES];
                chunk.copy_from_slice(&pending[..CHUNK_BYTES]);
                pending.drain(..CHUNK_BYTES);
                cb_target.send(chunk);
            }
        },
        |err| tracing::error!(%err, "audio capture stream error"),
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(%e, "failed to build input stream");
            let _ = ready_tx.send(Err(AnytalkError::DeviceUnavailable));
            return;
        }
    };

    if let Err(e) = stream.play() {
        tracing::error!(%e, "failed to start input stream");
        let _ = ready_tx.send(Err(AnytalkError::DeviceUnavailable));
        return;
    }
    tracing::info!("audio capture started");
    let _ = ready_tx.send(Ok(()));

    // The platform audio callback runs on its own thread; this thread
    // just has to keep `stream` alive (and dropped here, since it is
    // not `Send`) until a stop is requested.
    let _ = cmd_rx.recv();
    drop(stream);
    tracing::info!("audio capture stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_capture_is_not_running() {
        let target = Arc::new(AudioTarget::new());
        let capture = AudioCapture::new(target);
        assert!(capture.thread.lock().unwrap().is_none());
    }
}
