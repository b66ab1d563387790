//! Byte ring between the UART harvester and the frame assembler.
//!
//! ```text
//! ┌─────────────┐ push  ┌──────────────┐  pop  ┌──────────────┐
//! │ UART rx ISR │──────▶│   ByteRing   │──────▶│  Assembler   │
//! │ (producer)  │       │  (lock-free) │       │  (consumer)  │
//! └─────────────┘       └──────────────┘       └──────────────┘
//! ```
//!
//! Single producer, single consumer, split into two owned halves so the
//! discipline is enforced by the type system instead of by convention.
//! `push` never blocks and never allocates.  On a full ring the newest
//! bytes are dropped and `overflow_count` increments; unread data is never
//! overwritten.  `pop` parks the consumer thread until data arrives or the
//! timeout expires.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::stats::{Counter, RingSnapshot};

struct RingShared {
    /// One slot more than the usable capacity so full and empty differ.
    buf: Box<[UnsafeCell<u8>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    accepted: Counter,
    overflow_count: Counter,
    dropped_bytes: Counter,
    /// Consumer thread parked in `pop`.  The producer only ever `try_lock`s.
    waiter: Mutex<Option<Thread>>,
}

// SAFETY: `buf` cells are written only by the single `RingProducer` in the
// free region [head, tail) and read only by the single `RingConsumer` in the
// filled region [tail, head).  Publication happens through the Release store
// of `head`/`tail` paired with the Acquire load on the other side.
unsafe impl Sync for RingShared {}

impl RingShared {
    #[inline]
    fn slots(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    fn used(&self, head: usize, tail: usize) -> usize {
        (head + self.slots() - tail) % self.slots()
    }

    fn wake(&self) {
        if let Ok(waiter) = self.waiter.try_lock() {
            if let Some(thread) = waiter.as_ref() {
                thread.unpark();
            }
        }
    }
}

/// Allocate a ring that holds `capacity` bytes and split it into halves.
pub fn byte_ring(capacity: usize) -> Result<(RingProducer, RingConsumer)> {
    if capacity == 0 {
        return Err(Error::Config("ring capacity must be non-zero"));
    }
    let mut cells: Vec<UnsafeCell<u8>> = Vec::new();
    cells
        .try_reserve_exact(capacity + 1)
        .map_err(|_| Error::Init("ring buffer allocation failed"))?;
    cells.resize_with(capacity + 1, || UnsafeCell::new(0));

    let shared = Arc::new(RingShared {
        buf: cells.into_boxed_slice(),
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        accepted: Counter::new(),
        overflow_count: Counter::new(),
        dropped_bytes: Counter::new(),
        waiter: Mutex::new(None),
    });
    Ok((
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    ))
}

// ── Producer ──────────────────────────────────────────────────

/// Write half.  Owned by the harvester (interrupt-side) context.
pub struct RingProducer {
    shared: Arc<RingShared>,
}

impl RingProducer {
    /// Copy as much of `data` as fits.  Returns the number of bytes accepted.
    ///
    /// Bounded time, no allocation, no blocking lock.  A short accept bumps
    /// `overflow_count` once and the rest of the chunk is dropped.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let s = &*self.shared;
        let head = s.head.load(Ordering::Relaxed);
        let tail = s.tail.load(Ordering::Acquire);
        let free = s.slots() - 1 - s.used(head, tail);
        let n = data.len().min(free);

        for (i, &byte) in data[..n].iter().enumerate() {
            // SAFETY: slot lies in the free region owned by the producer.
            unsafe {
                *s.buf[(head + i) % s.slots()].get() = byte;
            }
        }

        if n > 0 {
            s.head.store((head + n) % s.slots(), Ordering::Release);
            s.accepted.add(n);
            s.wake();
        }
        if n < data.len() {
            s.overflow_count.incr();
            s.dropped_bytes.add(data.len() - n);
        }
        n
    }

    pub fn monitor(&self) -> RingMonitor {
        RingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

// ── Consumer ──────────────────────────────────────────────────

/// Read half.  Owned by whoever holds the link token.
pub struct RingConsumer {
    shared: Arc<RingShared>,
}

impl RingConsumer {
    /// Copy up to `buf.len()` buffered bytes without waiting.
    pub fn try_pop(&mut self, buf: &mut [u8]) -> usize {
        let s = &*self.shared;
        let tail = s.tail.load(Ordering::Relaxed);
        let head = s.head.load(Ordering::Acquire);
        let n = s.used(head, tail).min(buf.len());

        for (i, out) in buf[..n].iter_mut().enumerate() {
            // SAFETY: slot lies in the filled region owned by the consumer.
            *out = unsafe { *s.buf[(tail + i) % s.slots()].get() };
        }
        if n > 0 {
            s.tail.store((tail + n) % s.slots(), Ordering::Release);
        }
        n
    }

    /// Wait up to `timeout` for data, then copy what is available.
    /// Returns 0 on timeout.  Never returns more than `buf.len()`.
    pub fn pop(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let n = self.try_pop(buf);
            if n > 0 {
                return n;
            }
            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            self.register_waiter();
            // Re-check after registering so a push racing the registration
            // is not slept through.
            let n = self.try_pop(buf);
            if n > 0 {
                return n;
            }
            thread::park_timeout(deadline - now);
        }
    }

    pub fn len(&self) -> usize {
        let s = &*self.shared;
        s.used(s.head.load(Ordering::Acquire), s.tail.load(Ordering::Relaxed))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register_waiter(&self) {
        let mut waiter = self
            .shared
            .waiter
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let current = thread::current();
        if waiter.as_ref().map(Thread::id) != Some(current.id()) {
            *waiter = Some(current);
        }
    }
}

// ── Monitor ───────────────────────────────────────────────────

/// Read-only view of ring occupancy and counters.
#[derive(Clone)]
pub struct RingMonitor {
    shared: Arc<RingShared>,
}

impl RingMonitor {
    /// Usable capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.shared.slots() - 1
    }

    pub fn buffered(&self) -> usize {
        let s = &*self.shared;
        s.used(s.head.load(Ordering::Acquire), s.tail.load(Ordering::Acquire))
    }

    pub fn overflow_count(&self) -> u32 {
        self.shared.overflow_count.get()
    }

    pub fn snapshot(&self) -> RingSnapshot {
        RingSnapshot {
            accepted_bytes: self.shared.accepted.get(),
            overflow_count: self.shared.overflow_count.get(),
            dropped_bytes: self.shared.dropped_bytes.get(),
            buffered: self.buffered() as u32,
            capacity: self.capacity() as u32,
        }
    }

    pub fn reset(&self) {
        self.shared.accepted.reset();
        self.shared.overflow_count.reset();
        self.shared.dropped_bytes.reset();
    }

    /// Count bytes lost outside the ring proper (deferred-bytes overflow).
    pub(crate) fn record_overflow(&self, dropped: usize) {
        self.shared.overflow_count.incr();
        self.shared.dropped_bytes.add(dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_preserves_order() {
        let (mut tx, mut rx) = byte_ring(8).unwrap();
        assert_eq!(tx.push(b"abc"), 3);
        assert_eq!(tx.push(b"de"), 2);
        let mut buf = [0u8; 8];
        assert_eq!(rx.try_pop(&mut buf), 5);
        assert_eq!(&buf[..5], b"abcde");
        assert!(rx.is_empty());
    }

    #[test]
    fn full_ring_truncates_and_counts_once() {
        let (mut tx, mut rx) = byte_ring(4).unwrap();
        let monitor = tx.monitor();
        assert_eq!(tx.push(b"abcdef"), 4);
        assert_eq!(monitor.overflow_count(), 1);
        assert_eq!(monitor.snapshot().dropped_bytes, 2);

        // Existing data is intact.
        let mut buf = [0u8; 8];
        assert_eq!(rx.try_pop(&mut buf), 4);
        assert_eq!(&buf[..4], b"abcd");
    }

    #[test]
    fn push_into_full_ring_accepts_nothing() {
        let (mut tx, _rx) = byte_ring(2).unwrap();
        assert_eq!(tx.push(b"xy"), 2);
        assert_eq!(tx.push(b"z"), 0);
        assert_eq!(tx.monitor().overflow_count(), 1);
    }

    #[test]
    fn wraps_around_the_end() {
        let (mut tx, mut rx) = byte_ring(4).unwrap();
        let mut buf = [0u8; 4];
        for round in 0..10u8 {
            let chunk = [round, round.wrapping_add(1), round.wrapping_add(2)];
            assert_eq!(tx.push(&chunk), 3);
            assert_eq!(rx.try_pop(&mut buf), 3);
            assert_eq!(&buf[..3], &chunk);
        }
    }

    #[test]
    fn pop_respects_max_len() {
        let (mut tx, mut rx) = byte_ring(16).unwrap();
        tx.push(b"0123456789");
        let mut buf = [0u8; 4];
        assert_eq!(rx.pop(&mut buf, Duration::ZERO), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(rx.len(), 6);
    }

    #[test]
    fn pop_times_out_on_empty_ring() {
        let (_tx, mut rx) = byte_ring(16).unwrap();
        let mut buf = [0u8; 4];
        let start = Instant::now();
        assert_eq!(rx.pop(&mut buf, Duration::from_millis(20)), 0);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn pop_wakes_on_push_from_other_thread() {
        let (mut tx, mut rx) = byte_ring(16).unwrap();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx.push(b"$GP");
        });
        let mut buf = [0u8; 8];
        let n = rx.pop(&mut buf, Duration::from_secs(2));
        producer.join().unwrap();
        assert!(n > 0);
        assert_eq!(&buf[..n], &b"$GP"[..n]);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(byte_ring(0), Err(Error::Config(_))));
    }
}
