//! Lock-free SPSC ring of fixed-size audio chunks.
//!
//! Exactly one thread may call [`AudioRing::push`] (the capture thread)
//! and exactly one (other) thread may call [`AudioRing::pop`] (the
//! session worker). Correctness relies on acquire/release ordering on
//! the two index atomics: a slot is fully written before the
//! write-index release store, and fully read after the read-index
//! acquire load, so no fence on the payload itself is needed.
#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 16 kHz, mono, S16LE ⇒ 640 samples × 2 bytes ≈ 40 ms.
pub(crate) const CHUNK_BYTES: usize = 1280;
/// Ring capacity in chunks.
pub(crate) const CAPACITY: usize = 32;

/// One fixed-size PCM chunk.
pub(crate) type AudioChunk = [u8; CHUNK_BYTES];

struct Slot(UnsafeCell<AudioChunk>);

// SAFETY: a slot is only ever touched by the producer (between
// observing it's free and the subsequent write-index release store) or
// by the consumer (after the matching write-index acquire load, until
// the read-index release store). The two never overlap on the same
// slot by construction of the index arithmetic below.
unsafe impl Sync for Slot {}

/// A fixed-capacity single-producer/single-consumer ring of audio
/// chunks bridging the capture thread to a session worker.
pub(crate) struct AudioRing {
    slots: [Slot; CAPACITY],
    write: AtomicUsize,
    read: AtomicUsize,
}

impl std::fmt::Debug for AudioRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRing")
            .field("write", &self.write.load(Ordering::Relaxed))
            .field("read", &self.read.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for AudioRing {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRing {
    /// A new, empty ring.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot(UnsafeCell::new([0u8; CHUNK_BYTES]))),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    /// Push a chunk. Never blocks. If the ring is full, the chunk is
    /// dropped (overflow policy: drop newest) and `false` is
    /// returned; no event is raised for this per §7's error table.
    pub(crate) fn push(&self, chunk: AudioChunk) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let next = (write + 1) % CAPACITY;
        if next == self.read.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: `next != read`, so this slot is not owned by the
        // consumer; only this (the single producer) thread writes here.
        unsafe {
            *self.slots[write].0.get() = chunk;
        }
        self.write.store(next, Ordering::Release);
        true
    }

    /// Pop a chunk. Never blocks; returns `None` when empty.
    pub(crate) fn pop(&self) -> Option<AudioChunk> {
        let read = self.read.load(Ordering::Relaxed);
        if read == self.write.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: `read != write`, so the producer has released this
        // slot; only this (the single consumer) thread reads here.
        let chunk = unsafe { *self.slots[read].0.get() };
        self.read.store((read + 1) % CAPACITY, Ordering::Release);
        Some(chunk)
    }

    /// Whether the ring currently holds no chunks.
    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn chunk(tag: u8) -> AudioChunk {
        let mut c = [0u8; CHUNK_BYTES];
        c[0] = tag;
        c
    }

    #[test]
    fn empty_ring_pop_returns_none() {
        let ring = AudioRing::new();
        assert!(ring.pop().is_none());
    }

    #[test]
    fn push_then_pop_round_trips_in_order() {
        let ring = AudioRing::new();
        assert!(ring.push(chunk(1)));
        assert!(ring.push(chunk(2)));
        assert_eq!(ring.pop().unwrap()[0], 1);
        assert_eq!(ring.pop().unwrap()[0], 2);
        assert!(ring.pop().is_none());
    }

    #[test]
    fn overflow_drops_newest_without_blocking() {
        let ring = AudioRing::new();
        for i in 0..(CAPACITY - 1) {
            assert!(ring.push(chunk(i as u8)));
        }
        // One more slot is reserved so write+1 never equals read; the
        // ring is now full.
        assert!(!ring.push(chunk(255)));
        assert_eq!(ring.pop().unwrap()[0], 0);
    }

    #[test]
    fn concurrent_spsc_consumer_sees_prefix_of_producer_sequence() {
        let ring = Arc::new(AudioRing::new());
        let producer_ring = Arc::clone(&ring);
        const N: u8 = 200;

        let producer = thread::spawn(move || {
            let mut pushed = 0u8;
            while pushed < N {
                if producer_ring.push(chunk(pushed)) {
                    pushed += 1;
                }
            }
        });

        let mut observed = Vec::new();
        while observed.len() < N as usize {
            if let Some(c) = ring.pop() {
                observed.push(c[0]);
            }
        }
        producer.join().unwrap();

        let expected: Vec<u8> = (0..N).collect();
        assert_eq!(observed, expected);
    }
}
