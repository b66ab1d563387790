//! Cross-core transport queue: capture context → transmission context.
//!
//! A bounded FIFO of owned [`Frame`]s.  A frame that cannot be enqueued
//! is dropped right here, which returns its buffer to the pool, and
//! `transport_drops` increments once.  Fresh data wins over stale data.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{
    Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError, bounded,
};

use crate::config::EnqueuePolicy;
use crate::error::{Error, Result};
use crate::stats::{Counter, TransportSnapshot};
use crate::stream::frame::Frame;

/// Why a frame did not make it into the queue.  The frame is gone either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Queue stayed full for the whole timeout.
    TimedOut,
    /// The transmission side has shut down.
    Disconnected,
}

/// Queue counters.
#[derive(Debug, Default)]
pub struct QueueStats {
    enqueued: Counter,
    drops: Counter,
    /// Last observed queue length, refreshed on every enqueue/dequeue.
    depth: Counter,
}

impl QueueStats {
    pub fn enqueued(&self) -> u32 {
        self.enqueued.get()
    }

    /// `transport_drop_count`.
    pub fn drops(&self) -> u32 {
        self.drops.get()
    }

    pub fn reset(&self) {
        self.enqueued.reset();
        self.drops.reset();
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            enqueued: self.enqueued(),
            transport_drops: self.drops(),
            depth: self.depth.get(),
        }
    }
}

/// Create a queue holding at most `depth` frames.
pub fn transport_queue(depth: usize) -> Result<(TransportSender, TransportReceiver)> {
    if depth == 0 {
        return Err(Error::Config("transport queue depth must be non-zero"));
    }
    let (tx, rx) = bounded(depth);
    let stats = Arc::new(QueueStats::default());
    Ok((
        TransportSender {
            tx,
            stats: Arc::clone(&stats),
        },
        TransportReceiver { rx, stats },
    ))
}

// ── Producer side ─────────────────────────────────────────────

#[derive(Clone)]
pub struct TransportSender {
    tx: Sender<Frame>,
    stats: Arc<QueueStats>,
}

impl TransportSender {
    /// Enqueue, waiting up to `timeout` for room.  A zero timeout never waits.
    pub fn enqueue(&self, frame: Frame, timeout: Duration) -> core::result::Result<(), EnqueueError> {
        let outcome = if timeout.is_zero() {
            self.tx.try_send(frame).map_err(|e| match e {
                TrySendError::Full(_) => EnqueueError::TimedOut,
                TrySendError::Disconnected(_) => EnqueueError::Disconnected,
            })
        } else {
            self.tx.send_timeout(frame, timeout).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => EnqueueError::TimedOut,
                SendTimeoutError::Disconnected(_) => EnqueueError::Disconnected,
            })
        };

        // On error the rejected frame was dropped inside the match above,
        // which already handed its buffer back to the pool.
        match outcome {
            Ok(()) => self.stats.enqueued.incr(),
            Err(_) => self.stats.drops.incr(),
        }
        self.stats.depth.set(self.tx.len() as u32);
        outcome
    }

    /// Enqueue according to the deployment's policy.
    pub fn submit(&self, frame: Frame, policy: EnqueuePolicy) -> core::result::Result<(), EnqueueError> {
        self.enqueue(frame, policy.timeout())
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

// ── Consumer side ─────────────────────────────────────────────

/// Outcome of one bounded wait on the queue.
#[derive(Debug)]
pub enum Dequeued {
    Frame(Frame),
    /// Timed out with nothing queued.
    Empty,
    /// Every sender is gone and the queue is drained.
    Closed,
}

pub struct TransportReceiver {
    rx: Receiver<Frame>,
    stats: Arc<QueueStats>,
}

impl TransportReceiver {
    /// Wait up to `timeout` for the oldest frame.
    pub fn poll(&self, timeout: Duration) -> Dequeued {
        let outcome = match self.rx.recv_timeout(timeout) {
            Ok(frame) => Dequeued::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Dequeued::Empty,
            Err(RecvTimeoutError::Disconnected) => Dequeued::Closed,
        };
        self.stats.depth.set(self.rx.len() as u32);
        outcome
    }

    /// Wait up to `timeout` for the oldest frame.
    /// `None` on timeout or once every sender is gone and the queue is empty.
    pub fn dequeue(&self, timeout: Duration) -> Option<Frame> {
        match self.poll(timeout) {
            Dequeued::Frame(frame) => Some(frame),
            Dequeued::Empty | Dequeued::Closed => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}
