//! Fixed set of reusable frame buffers.
//!
//! Arena + index: every slot owns one pre-allocated `Vec<u8>` of the frame
//! capacity.  Checkout moves the vector out of its slot into a [`FrameBuf`]
//! handle; dropping the handle moves it back.  Ownership therefore travels
//! with the frame (assembler → router → handler → transport → worker) and
//! a slot can never be handed out twice or released twice.
//!
//! The slot table sits behind a critical-section mutex that is held only for
//! the state flip, never while bytes are copied.

use core::cell::RefCell;
use core::fmt;
use core::ops::Deref;
use std::sync::Arc;

use embassy_sync::blocking_mutex::CriticalSectionMutex;

use crate::config::MIN_POOL_SLOTS;
use crate::error::{Error, Result};
use crate::stats::{Counter, PoolSnapshot};

struct PoolState {
    /// `Some` = Free (buffer parked here), `None` = InUse (buffer out on loan).
    slots: Vec<Option<Vec<u8>>>,
    last_granted: Option<usize>,
    in_use: usize,
}

struct PoolInner {
    state: CriticalSectionMutex<RefCell<PoolState>>,
    slot_count: usize,
    frame_capacity: usize,
    exhausted: Counter,
    checkouts: Counter,
}

impl PoolInner {
    fn put_back(&self, slot: usize, data: Vec<u8>) {
        self.state.lock(|cell| {
            let mut st = cell.borrow_mut();
            st.slots[slot] = Some(data);
            st.in_use -= 1;
        });
    }
}

/// Cloneable handle to a shared frame pool.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Allocate `slots` buffers of `frame_capacity` bytes each.
    pub fn new(slots: usize, frame_capacity: usize) -> Result<Self> {
        if slots < usize::from(MIN_POOL_SLOTS) {
            return Err(Error::Config("frame pool needs at least 3 slots"));
        }
        if frame_capacity == 0 {
            return Err(Error::Config("frame capacity must be non-zero"));
        }

        let mut table = Vec::new();
        table
            .try_reserve_exact(slots)
            .map_err(|_| Error::Init("frame pool table allocation failed"))?;
        for _ in 0..slots {
            let mut buf = Vec::new();
            buf.try_reserve_exact(frame_capacity)
                .map_err(|_| Error::Init("frame buffer allocation failed"))?;
            table.push(Some(buf));
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                state: CriticalSectionMutex::new(RefCell::new(PoolState {
                    slots: table,
                    last_granted: None,
                    in_use: 0,
                })),
                slot_count: slots,
                frame_capacity,
                exhausted: Counter::new(),
                checkouts: Counter::new(),
            }),
        })
    }

    /// Take the first free slot after the last granted one.
    ///
    /// Returns `None` (and bumps `pool_exhausted_count`) when every slot is
    /// in use.  Callers treat that as backpressure.
    pub fn checkout(&self) -> Option<FrameBuf> {
        let granted = self.inner.state.lock(|cell| {
            let mut st = cell.borrow_mut();
            let n = st.slots.len();
            let start = st.last_granted.map_or(0, |i| (i + 1) % n);
            for step in 0..n {
                let slot = (start + step) % n;
                if let Some(data) = st.slots[slot].take() {
                    st.last_granted = Some(slot);
                    st.in_use += 1;
                    return Some((slot, data));
                }
            }
            None
        });

        match granted {
            Some((slot, mut data)) => {
                data.clear();
                self.inner.checkouts.incr();
                Some(FrameBuf {
                    slot,
                    data,
                    pool: Arc::clone(&self.inner),
                })
            }
            None => {
                self.inner.exhausted.incr();
                None
            }
        }
    }

    /// Return a buffer to the pool.  Equivalent to dropping the handle;
    /// provided so call sites can make the hand-back explicit.
    pub fn release(&self, frame: FrameBuf) {
        debug_assert!(Arc::ptr_eq(&self.inner, &frame.pool));
        drop(frame);
    }

    pub fn slots(&self) -> usize {
        self.inner.slot_count
    }

    pub fn frame_capacity(&self) -> usize {
        self.inner.frame_capacity
    }

    pub fn in_use(&self) -> usize {
        self.inner.state.lock(|cell| cell.borrow().in_use)
    }

    pub fn available(&self) -> usize {
        self.slots() - self.in_use()
    }

    pub fn exhausted_count(&self) -> u32 {
        self.inner.exhausted.get()
    }

    pub fn checkouts(&self) -> u32 {
        self.inner.checkouts.get()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            slots: self.slots() as u32,
            in_use: self.in_use() as u32,
            exhausted_count: self.exhausted_count(),
        }
    }

    pub fn reset_counters(&self) {
        self.inner.exhausted.reset();
        self.inner.checkouts.reset();
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("slots", &self.slots())
            .field("frame_capacity", &self.frame_capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

// ── Frame buffer handle ───────────────────────────────────────

/// Exclusive loan of one pool slot.  Goes back to the pool on drop.
pub struct FrameBuf {
    slot: usize,
    data: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl FrameBuf {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn capacity(&self) -> usize {
        self.pool.frame_capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.data.len()
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Append as much of `bytes` as fits.  Returns the count appended.
    /// The backing vector never grows past the slot capacity.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        self.data.extend_from_slice(&bytes[..n]);
        n
    }

    /// Drop trailing carriage returns.
    pub fn trim_trailing_cr(&mut self) {
        while self.data.last() == Some(&b'\r') {
            self.data.pop();
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl Deref for FrameBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for FrameBuf {
    fn drop(&mut self) {
        let data = core::mem::take(&mut self.data);
        self.pool.put_back(self.slot, data);
    }
}

impl fmt::Debug for FrameBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuf")
            .field("slot", &self.slot)
            .field("len", &self.data.len())
            .finish()
    }
}
