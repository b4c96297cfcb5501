//! Audio sink registration.
//!
//! A mutable slot holding zero or one destination ring. Context sets it
//! when a session starts and clears it on stop/cancel; the capture
//! thread calls [`AudioTarget::send`] for every chunk it reads and
//! never needs to know whether a session is currently listening.

use std::sync::{Arc, Mutex};

use crate::ring::{AudioChunk, AudioRing};

/// The sink a [`crate::session::Session`] registers so the capture
/// thread can reach its ring without a direct reference to the session.
#[derive(Default)]
pub(crate) struct AudioTarget {
    ring: Mutex<Option<Arc<AudioRing>>>,
}

impl std::fmt::Debug for AudioTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioTarget")
            .field("active", &self.is_active())
            .finish()
    }
}

impl AudioTarget {
    /// An inactive target.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `ring` as the current destination.
    pub(crate) fn set(&self, ring: Arc<AudioRing>) {
        *self.ring.lock().expect("audio target mutex poisoned") = Some(ring);
    }

    /// Detach the current destination, if any.
    pub(crate) fn clear(&self) {
        *self.ring.lock().expect("audio target mutex poisoned") = None;
    }

    /// Whether a destination is currently registered.
    #[must_use]
    pub(crate) fn is_active(&self) -> bool {
        self.ring.lock().expect("audio target mutex poisoned").is_some()
    }

    /// Forward one chunk to the registered ring, if any. A no-op
    /// (silently drops the chunk) when no session is listening.
    pub(crate) fn send(&self, chunk: AudioChunk) {
        if let Some(ring) = self.ring.lock().expect("audio target mutex poisoned").as_ref() {
            ring.push(chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_by_default_and_send_is_a_harmless_no_op() {
        let target = AudioTarget::new();
        assert!(!target.is_active());
        target.send([0u8; crate::ring::CHUNK_BYTES]);
    }

    #[test]
    fn set_then_clear_round_trips_activity() {
        let target = AudioTarget::new();
        let ring = Arc::new(AudioRing::new());
        target.set(Arc::clone(&ring));
        assert!(target.is_active());

        target.send([7u8; crate::ring::CHUNK_BYTES]);
        assert_eq!(ring.pop().unwrap()[0], 7);

        target.clear();
        assert!(!target.is_active());
    }
}
