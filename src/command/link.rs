//! Exclusive ownership of the shared serial link.
//!
//! Streaming GNSS output and AT command/response traffic share one UART.
//! Whoever holds the [`SharedLink`] token may read and write it:
//!
//! - the capture loop takes the token with [`SharedLink::try_acquire`] once
//!   per iteration and skips the iteration if a command window is open;
//! - the command engine takes it with [`SharedLink::acquire`] for the whole
//!   request/response cycle.
//!
//! Bytes the capture loop has not read yet stay in the ring.  Positioning
//! lines the engine reads during its window are parked in a bounded
//! deferred FIFO, which the capture path drains before fresh ring bytes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use crate::app::ports::LinkTx;
use crate::capture::ring::{RingConsumer, RingMonitor};
use crate::error::{Error, LinkError, Result};

/// Guard proving exclusive ownership of the link.
pub type LinkGuard<'a> = MutexGuard<'a, LinkPort>;

pub struct LinkPort {
    rx: RingConsumer,
    tx: Box<dyn LinkTx>,
    deferred: VecDeque<u8>,
    deferred_capacity: usize,
    ring: RingMonitor,
    windows: u32,
}

impl LinkPort {
    /// Streaming read: deferred bytes first, then the ring.
    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        if !self.deferred.is_empty() {
            let n = buf.len().min(self.deferred.len());
            for (dst, src) in buf.iter_mut().zip(self.deferred.drain(..n)) {
                *dst = src;
            }
            return n;
        }
        self.rx.pop(buf, timeout)
    }

    /// Response read: ring only.  Deferred bytes belong to the capture path.
    pub fn read_response(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        self.rx.pop(buf, timeout)
    }

    /// Write all of `data` and flush it to the wire.
    pub fn write(&mut self, data: &[u8]) -> core::result::Result<(), LinkError> {
        self.tx.write_all(data)?;
        self.tx.flush()
    }

    /// Hand bytes back to the capture path.  Returns how many fit; the rest
    /// are counted as ring overflow.
    pub fn defer(&mut self, bytes: &[u8]) -> usize {
        let room = self.deferred_capacity - self.deferred.len();
        let n = bytes.len().min(room);
        self.deferred.extend(&bytes[..n]);
        if n < bytes.len() {
            self.ring.record_overflow(bytes.len() - n);
        }
        n
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Unread bytes: deferred plus ring.
    pub fn pending(&self) -> usize {
        self.deferred.len() + self.rx.len()
    }

    /// Number of command windows opened so far (wrapping).
    pub fn window_count(&self) -> u32 {
        self.windows
    }

    pub(crate) fn begin_window(&mut self) {
        self.windows = self.windows.wrapping_add(1);
    }
}

/// Cloneable handle to the link token.
#[derive(Clone)]
pub struct SharedLink {
    port: Arc<Mutex<LinkPort>>,
}

impl SharedLink {
    pub fn new(
        rx: RingConsumer,
        tx: impl LinkTx + 'static,
        ring: RingMonitor,
        deferred_capacity: usize,
    ) -> Result<Self> {
        let mut deferred = VecDeque::new();
        deferred
            .try_reserve_exact(deferred_capacity)
            .map_err(|_| Error::Init("deferred buffer allocation failed"))?;
        Ok(Self {
            port: Arc::new(Mutex::new(LinkPort {
                rx,
                tx: Box::new(tx),
                deferred,
                deferred_capacity,
                ring,
                windows: 0,
            })),
        })
    }

    /// Non-blocking acquire for the capture loop.
    pub fn try_acquire(&self) -> Option<LinkGuard<'_>> {
        match self.port.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Blocking acquire for command windows.
    pub fn acquire(&self) -> LinkGuard<'_> {
        self.port.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
