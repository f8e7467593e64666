//! Bounded ring of display-ready frames
//!
//! This module decouples the decode worker from the presentation loop: the
//! worker fills pre-allocated RGBA slots ahead of playback, the presenter
//! drains them in production order at its own pace.
//!
//! # Design
//!
//! The ring tracks two monotonic counters:
//! - **`decoded`**: frames committed by the producer
//! - **`read`**: frames consumed by the presenter
//!
//! Frame `n` lives in slot `n % capacity`, and at every instant
//! `read <= decoded <= read + capacity` holds: the producer never reclaims a
//! slot the consumer has not finished with, and the consumer never observes a
//! slot that has not been committed. Both sides park on condition variables
//! when they run out of work — there is no spin-polling.
//!
//! Two lifecycle flags ride along: `filled` (the initial buffer fill is done,
//! possibly short on early end-of-stream) and `ended` (no frame will ever be
//! produced again).
//!
//! # Safety
//!
//! Slot storage uses `UnsafeCell` so the producer can write one slot while
//! the consumer reads another without a per-slot lock. This is sound because:
//!
//! 1. `RingProducer` and `RingConsumer` are single, non-clonable handles, so
//!    there is exactly one writer and one reader.
//! 2. A `WriteSlot` borrows the producer mutably and a `ReadSlot` borrows the
//!    consumer mutably, so each side holds at most one slot at a time.
//! 3. A `WriteSlot` exists only for frame `decoded` with
//!    `decoded - read < capacity`, a `ReadSlot` only for frame `read` with
//!    `read < decoded`; by the invariant those are always different slots.
//! 4. Counters are advanced with release stores and observed with acquire
//!    loads, ordering slot contents across the thread boundary.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::PlayerError;

/// Constructor for the producer/consumer handle pair.
pub struct FrameRing;

impl FrameRing {
    /// Allocate `capacity` slots of `frame_len` bytes each and split the ring
    /// into its two endpoints.
    pub fn with_capacity(
        capacity: usize,
        frame_len: usize,
    ) -> Result<(RingProducer, RingConsumer), PlayerError> {
        assert!(capacity > 0, "frame ring needs at least one slot");

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| PlayerError::Allocation {
                bytes: capacity * frame_len,
            })?;
        for _ in 0..capacity {
            let mut pixels = Vec::new();
            pixels
                .try_reserve_exact(frame_len)
                .map_err(|_| PlayerError::Allocation {
                    bytes: capacity * frame_len,
                })?;
            pixels.resize(frame_len, 0);
            slots.push(UnsafeCell::new(pixels.into_boxed_slice()));
        }

        let shared = Arc::new(Shared {
            slots: slots.into_boxed_slice(),
            decoded: AtomicU64::new(0),
            read: AtomicU64::new(0),
            filled: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            lock: Mutex::new(()),
            produced: Condvar::new(),
            consumed: Condvar::new(),
        });

        Ok((
            RingProducer {
                shared: shared.clone(),
            },
            RingConsumer { shared },
        ))
    }
}

struct Shared {
    slots: Box<[UnsafeCell<Box<[u8]>>]>,
    decoded: AtomicU64,
    read: AtomicU64,
    filled: AtomicBool,
    ended: AtomicBool,
    lock: Mutex<()>,
    /// Signaled when `decoded`, `filled` or `ended` changes.
    produced: Condvar,
    /// Signaled when `read` advances.
    consumed: Condvar,
}

// Safety: slot contents are plain bytes, and the access discipline documented
// above guarantees a slot is never aliased across threads.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn has_space(&self) -> bool {
        let decoded = self.decoded.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        debug_assert!(read <= decoded && decoded - read <= self.capacity() as u64);
        decoded - read < self.capacity() as u64
    }

    fn has_frame(&self) -> bool {
        let decoded = self.decoded.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        debug_assert!(read <= decoded && decoded - read <= self.capacity() as u64);
        read < decoded
    }

    /// # Safety
    ///
    /// The caller must hold the exclusive right to frame `index` per the
    /// module-level discipline.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_mut(&self, index: u64) -> &mut [u8] {
        let slot = index as usize % self.capacity();
        unsafe { &mut **self.slots[slot].get() }
    }

    /// # Safety
    ///
    /// Same contract as [`Shared::slot_mut`].
    unsafe fn slot(&self, index: u64) -> &[u8] {
        let slot = index as usize % self.capacity();
        unsafe { &**self.slots[slot].get() }
    }

    fn notify_produced(&self) {
        let _guard = self.lock.lock().unwrap();
        self.produced.notify_all();
    }

    fn notify_consumed(&self) {
        let _guard = self.lock.lock().unwrap();
        self.consumed.notify_all();
    }
}

// ── Producer side ───────────────────────────────────────────────

/// Writing endpoint, owned by the decode worker.
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn decoded(&self) -> u64 {
        self.shared.decoded.load(Ordering::Acquire)
    }

    /// Reserve the slot for the next frame, or `None` when the ring is full.
    pub fn try_reserve(&mut self) -> Option<WriteSlot<'_>> {
        if !self.shared.has_space() {
            return None;
        }
        Some(WriteSlot {
            shared: &*self.shared,
            index: self.shared.decoded.load(Ordering::Acquire),
        })
    }

    /// Reserve the slot for the next frame, parking up to `timeout` for the
    /// consumer to free one. Returns `None` on timeout so the caller can
    /// re-check its cancellation signal between waits.
    pub fn reserve_timeout(&mut self, timeout: Duration) -> Option<WriteSlot<'_>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.lock.lock().unwrap();
        loop {
            if self.shared.has_space() {
                drop(guard);
                let index = self.shared.decoded.load(Ordering::Acquire);
                return Some(WriteSlot {
                    shared: &*self.shared,
                    index,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (g, _) = self
                .shared
                .consumed
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = g;
        }
    }

    /// Mark the initial buffer fill as finished, full or not.
    pub fn mark_filled(&self) {
        self.shared.filled.store(true, Ordering::Release);
        self.shared.notify_produced();
    }

    /// Mark the stream as finished: no frame will ever be committed again.
    pub fn finish(&self) {
        self.shared.filled.store(true, Ordering::Release);
        self.shared.ended.store(true, Ordering::Release);
        self.shared.notify_produced();
    }
}

impl Drop for RingProducer {
    fn drop(&mut self) {
        // A vanished producer must not strand a parked consumer.
        self.finish();
    }
}

/// Exclusive write access to one reserved slot.
///
/// Committing publishes the frame and advances `decoded`; dropping the guard
/// without committing releases the reservation unchanged.
pub struct WriteSlot<'a> {
    shared: &'a Shared,
    index: u64,
}

impl WriteSlot<'_> {
    /// Ring slot this reservation maps to (`frame % capacity`).
    pub fn slot(&self) -> usize {
        self.index as usize % self.shared.capacity()
    }

    pub fn commit(self) {
        self.shared.decoded.fetch_add(1, Ordering::Release);
        self.shared.notify_produced();
    }
}

impl std::ops::Deref for WriteSlot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Safety: reservation grants exclusive access to this slot.
        unsafe { self.shared.slot(self.index) }
    }
}

impl std::ops::DerefMut for WriteSlot<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // Safety: reservation grants exclusive access to this slot.
        unsafe { self.shared.slot_mut(self.index) }
    }
}

// ── Consumer side ───────────────────────────────────────────────

/// Reading endpoint, owned by the presentation loop.
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn decoded(&self) -> u64 {
        self.shared.decoded.load(Ordering::Acquire)
    }

    pub fn read(&self) -> u64 {
        self.shared.read.load(Ordering::Acquire)
    }

    pub fn ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    pub fn filled(&self) -> bool {
        self.shared.filled.load(Ordering::Acquire)
    }

    /// Every frame that will ever exist has been displayed.
    pub fn is_complete(&self) -> bool {
        self.ended() && self.read() == self.decoded()
    }

    /// Take the oldest unread frame, or `None` when the ring is empty.
    pub fn try_read(&mut self) -> Option<ReadSlot<'_>> {
        if !self.shared.has_frame() {
            return None;
        }
        Some(ReadSlot {
            shared: &*self.shared,
            index: self.shared.read.load(Ordering::Acquire),
        })
    }

    /// Take the oldest unread frame, parking up to `timeout` for the producer.
    /// Returns `None` on timeout or once the stream has ended with nothing
    /// left to read.
    pub fn read_timeout(&mut self, timeout: Duration) -> Option<ReadSlot<'_>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.lock.lock().unwrap();
        loop {
            if self.shared.has_frame() {
                drop(guard);
                let index = self.shared.read.load(Ordering::Acquire);
                return Some(ReadSlot {
                    shared: &*self.shared,
                    index,
                });
            }
            if self.shared.ended.load(Ordering::Acquire) {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (g, _) = self
                .shared
                .produced
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = g;
        }
    }

    /// Park up to `timeout` for the initial buffer fill; returns whether
    /// `filled` has been observed.
    pub fn wait_filled_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.lock.lock().unwrap();
        loop {
            if self.shared.filled.load(Ordering::Acquire) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (g, _) = self
                .shared
                .produced
                .wait_timeout(guard, deadline - now)
                .unwrap();
            guard = g;
        }
    }
}

/// Read access to the oldest unread frame.
///
/// Committing releases the slot back to the producer; dropping without
/// committing leaves the frame unread.
pub struct ReadSlot<'a> {
    shared: &'a Shared,
    index: u64,
}

impl ReadSlot<'_> {
    /// Ring slot this frame lives in (`frame % capacity`).
    pub fn slot(&self) -> usize {
        self.index as usize % self.shared.capacity()
    }

    /// Whether this is the final frame of the stream.
    pub fn is_last(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
            && self.index + 1 == self.shared.decoded.load(Ordering::Acquire)
    }

    pub fn commit(self) {
        self.shared.read.fetch_add(1, Ordering::Release);
        self.shared.notify_consumed();
    }
}

impl std::ops::Deref for ReadSlot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Safety: only committed, unread frames are handed out.
        unsafe { self.shared.slot(self.index) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const FRAME_LEN: usize = 16;

    fn ring(capacity: usize) -> (RingProducer, RingConsumer) {
        FrameRing::with_capacity(capacity, FRAME_LEN).unwrap()
    }

    fn write_frame(producer: &mut RingProducer, value: u8) {
        let mut slot = producer.try_reserve().expect("ring full");
        slot.fill(value);
        slot.commit();
    }

    #[test]
    fn test_empty_ring() {
        let (_producer, mut consumer) = ring(4);
        assert!(consumer.try_read().is_none());
        assert_eq!(consumer.decoded(), 0);
        assert_eq!(consumer.read(), 0);
        assert!(!consumer.filled());
        assert!(!consumer.ended());
    }

    #[test]
    fn test_write_then_read() {
        let (mut producer, mut consumer) = ring(4);
        write_frame(&mut producer, 7);

        let slot = consumer.try_read().unwrap();
        assert_eq!(&*slot, &[7u8; FRAME_LEN]);
        slot.commit();

        assert_eq!(consumer.read(), 1);
        assert!(consumer.try_read().is_none());
    }

    #[test]
    fn test_full_ring_rejects_writes() {
        let (mut producer, mut consumer) = ring(2);
        write_frame(&mut producer, 0);
        write_frame(&mut producer, 1);

        assert!(producer.try_reserve().is_none());
        assert!(
            producer
                .reserve_timeout(Duration::from_millis(10))
                .is_none()
        );

        // Freeing one slot unblocks exactly one write.
        consumer.try_read().unwrap().commit();
        assert!(producer.try_reserve().is_some());
    }

    #[test]
    fn test_uncommitted_write_releases_slot() {
        let (mut producer, mut consumer) = ring(1);
        {
            let mut slot = producer.try_reserve().unwrap();
            slot.fill(9);
            // Dropped without commit.
        }
        assert_eq!(producer.decoded(), 0);
        assert!(consumer.try_read().is_none());
    }

    #[test]
    fn test_slot_indices_wrap() {
        let (mut producer, mut consumer) = ring(3);
        for frame in 0..7u8 {
            let slot = producer.try_reserve().unwrap();
            assert_eq!(slot.slot(), frame as usize % 3);
            let mut slot = slot;
            slot.fill(frame);
            slot.commit();

            let slot = consumer.try_read().unwrap();
            assert_eq!(slot.slot(), frame as usize % 3);
            assert_eq!(slot[0], frame);
            slot.commit();
        }
    }

    #[test]
    fn test_frames_arrive_in_order() {
        let (mut producer, mut consumer) = ring(4);
        for frame in 0..4u8 {
            write_frame(&mut producer, frame);
        }
        for frame in 0..4u8 {
            let slot = consumer.try_read().unwrap();
            assert_eq!(slot[0], frame);
            slot.commit();
        }
    }

    #[test]
    fn test_is_last_requires_ended() {
        let (mut producer, mut consumer) = ring(4);
        write_frame(&mut producer, 0);
        write_frame(&mut producer, 1);

        assert!(!consumer.try_read().unwrap().is_last());
        producer.finish();

        let first = consumer.try_read().unwrap();
        assert!(!first.is_last());
        first.commit();

        let last = consumer.try_read().unwrap();
        assert!(last.is_last());
        last.commit();

        assert!(consumer.is_complete());
    }

    #[test]
    fn test_read_timeout_returns_none_after_end() {
        let (producer, mut consumer) = ring(4);
        producer.finish();

        let start = Instant::now();
        assert!(consumer.read_timeout(Duration::from_secs(10)).is_none());
        // Must bail out immediately, not sleep out the timeout.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_filled() {
        let (producer, consumer) = ring(4);
        assert!(!consumer.wait_filled_timeout(Duration::from_millis(5)));

        producer.mark_filled();
        assert!(consumer.wait_filled_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_dropping_producer_ends_stream() {
        let (producer, consumer) = ring(4);
        drop(producer);
        assert!(consumer.ended());
        assert!(consumer.filled());
        assert!(consumer.is_complete());
    }

    #[test]
    fn test_blocking_handoff_across_threads() {
        let (mut producer, mut consumer) = ring(2);

        let writer = thread::spawn(move || {
            for frame in 0..100u8 {
                loop {
                    match producer.reserve_timeout(Duration::from_millis(100)) {
                        Some(mut slot) => {
                            slot.fill(frame);
                            slot.commit();
                            break;
                        }
                        None => continue,
                    }
                }
            }
            producer.finish();
        });

        let mut expected = 0u8;
        while let Some(slot) = consumer.read_timeout(Duration::from_secs(5)) {
            // Strictly increasing production order: no skips, no repeats,
            // and every byte of the slot agrees (no torn frames).
            assert!(slot.iter().all(|&b| b == expected));
            slot.commit();
            expected += 1;
        }

        writer.join().unwrap();
        assert_eq!(expected, 100);
        assert!(consumer.is_complete());
    }

    #[test]
    fn test_invariant_under_concurrent_load() {
        let (mut producer, mut consumer) = ring(3);
        let capacity = 3u64;

        let writer = thread::spawn(move || {
            for frame in 0..500u16 {
                loop {
                    if let Some(mut slot) = producer.reserve_timeout(Duration::from_millis(50)) {
                        slot.fill(frame as u8);
                        slot.commit();
                        break;
                    }
                }
            }
            producer.finish();
        });

        let mut seen = 0u64;
        loop {
            let decoded = consumer.decoded();
            let read = consumer.read();
            assert!(read <= decoded);
            assert!(decoded <= read + capacity);

            match consumer.read_timeout(Duration::from_millis(50)) {
                Some(slot) => {
                    slot.commit();
                    seen += 1;
                }
                None => {
                    if consumer.is_complete() {
                        break;
                    }
                }
            }
        }

        writer.join().unwrap();
        assert_eq!(seen, 500);
    }
}
