//! Pipeline statistics.
//!
//! Every component owns its counters and hands out an `Arc` to them.
//! [`StatsHandles`] collects those handles so operational tooling can take
//! a read-only [`StatsSnapshot`] at any time.  Readers may observe a
//! slightly stale view; that is fine for telemetry.
//!
//! Counters are 32-bit atomics: the ESP32-S3 has no native 64-bit atomics.
//! They wrap rather than saturate, so rate maths always uses deltas with
//! `wrapping_sub`.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::assembler::AssemblerStats;
use crate::capture::pool::FramePool;
use crate::capture::ring::RingMonitor;
use crate::command::engine::CommandStats;
use crate::error::Fault;
use crate::stream::frame::Category;
use crate::stream::router::RouterStats;
use crate::transport::queue::QueueStats;
use crate::transport::worker::WorkerStats;

// ── Counter ───────────────────────────────────────────────────

/// Monotonic event counter, safe to bump from any context.
#[derive(Debug, Default)]
pub struct Counter(AtomicU32);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, n: usize) {
        self.0.fetch_add(n as u32, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Operator reset.  Nothing inside the pipeline calls this.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    /// Store a derived value (rates, gauges).
    pub fn set(&self, v: u32) {
        self.0.store(v, Ordering::Relaxed);
    }
}

// ── Throughput ────────────────────────────────────────────────

/// Bytes-per-second estimate refreshed once per interval from the bytes
/// recorded since the previous refresh.
#[derive(Debug)]
pub struct ThroughputMeter {
    interval: Duration,
    window_start: Instant,
    window_bytes: u64,
    rate: u32,
}

impl ThroughputMeter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            window_bytes: 0,
            rate: 0,
        }
    }

    pub fn record(&mut self, bytes: usize) {
        self.window_bytes += bytes as u64;
    }

    /// Recompute the rate if the interval elapsed.  Returns the new rate
    /// when it was refreshed.
    pub fn poll(&mut self, now: Instant) -> Option<u32> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let millis = elapsed.as_millis().max(1) as u64;
        self.rate = (self.window_bytes * 1000 / millis).min(u64::from(u32::MAX)) as u32;
        self.window_bytes = 0;
        self.window_start = now;
        Some(self.rate)
    }

    /// Last computed rate in bytes per second.
    pub fn rate(&self) -> u32 {
        self.rate
    }
}

// ── Snapshot ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RingSnapshot {
    pub accepted_bytes: u32,
    pub overflow_count: u32,
    pub dropped_bytes: u32,
    pub buffered: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub slots: u32,
    pub in_use: u32,
    pub exhausted_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssemblerSnapshot {
    pub frames: u32,
    pub bytes: u32,
    pub overrun_bytes: u32,
    pub oversize_frames: u32,
    pub resyncs: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterSnapshot {
    pub routed: u32,
    /// Indexed by [`Category::index`].
    pub per_category: [u32; Category::COUNT],
    pub unhandled: u32,
}

impl RouterSnapshot {
    pub fn count(&self, category: Category) -> u32 {
        self.per_category[category.index()]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportSnapshot {
    pub enqueued: u32,
    pub transport_drops: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    pub frames_sent: u32,
    pub bytes_sent: u32,
    pub transmission_errors: u32,
    pub throughput_bps: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandSnapshot {
    pub sent: u32,
    pub matched: u32,
    pub timeouts: u32,
    pub errors_seen: u32,
}

/// Read-only view of every pipeline counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ring: RingSnapshot,
    pub pool: PoolSnapshot,
    pub assembler: AssemblerSnapshot,
    pub router: RouterSnapshot,
    pub transport: TransportSnapshot,
    pub worker: WorkerSnapshot,
    pub command: CommandSnapshot,
    pub capture_yields: u32,
}

impl StatsSnapshot {
    /// The counter that records occurrences of `fault`.
    pub fn fault_count(&self, fault: Fault) -> u32 {
        match fault {
            Fault::OverflowDrop => self.ring.overflow_count,
            Fault::PoolExhausted => self.pool.exhausted_count,
            Fault::OversizeFrame => self.assembler.oversize_frames,
            Fault::ClassificationMiss => self.router.unhandled,
            Fault::TransportTimeout => self.transport.transport_drops,
            Fault::TransmissionFailure => self.worker.transmission_errors,
            Fault::CommandTimeout => self.command.timeouts,
            Fault::CommandError => self.command.errors_seen,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Handles ───────────────────────────────────────────────────

/// Shared handles to every component's counters.
#[derive(Clone)]
pub struct StatsHandles {
    pub(crate) ring: RingMonitor,
    pub(crate) pool: FramePool,
    pub(crate) assembler: Arc<AssemblerStats>,
    pub(crate) router: Arc<RouterStats>,
    pub(crate) queue: Arc<QueueStats>,
    pub(crate) worker: Arc<WorkerStats>,
    pub(crate) command: Arc<CommandStats>,
    pub(crate) capture_yields: Arc<Counter>,
}

impl StatsHandles {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ring: self.ring.snapshot(),
            pool: self.pool.snapshot(),
            assembler: self.assembler.snapshot(),
            router: self.router.snapshot(),
            transport: self.queue.snapshot(),
            worker: self.worker.snapshot(),
            command: self.command.snapshot(),
            capture_yields: self.capture_yields.get(),
        }
    }

    /// Zero every counter.  Explicit operator action only.
    pub fn reset(&self) {
        self.ring.reset();
        self.pool.reset_counters();
        self.assembler.reset();
        self.router.reset();
        self.queue.reset();
        self.worker.reset();
        self.command.reset();
        self.capture_yields.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_wraps_instead_of_panicking() {
        let c = Counter::new();
        c.set(u32::MAX);
        c.incr();
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn throughput_waits_for_interval() {
        let t0 = Instant::now();
        let mut meter = ThroughputMeter::new(Duration::from_secs(1), t0);
        meter.record(4096);
        assert_eq!(meter.poll(t0 + Duration::from_millis(500)), None);
        assert_eq!(meter.rate(), 0);
    }

    #[test]
    fn throughput_is_bytes_over_elapsed() {
        let t0 = Instant::now();
        let mut meter = ThroughputMeter::new(Duration::from_secs(1), t0);
        meter.record(1500);
        meter.record(1500);
        assert_eq!(meter.poll(t0 + Duration::from_secs(2)), Some(1500));

        // Window restarts from the refresh point.
        assert_eq!(meter.poll(t0 + Duration::from_secs(3)), Some(0));
    }

    #[test]
    fn fault_counts_map_to_named_counters() {
        let snap = StatsSnapshot {
            ring: RingSnapshot {
                overflow_count: 1,
                ..Default::default()
            },
            pool: PoolSnapshot {
                exhausted_count: 2,
                ..Default::default()
            },
            transport: TransportSnapshot {
                transport_drops: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(snap.fault_count(Fault::OverflowDrop), 1);
        assert_eq!(snap.fault_count(Fault::PoolExhausted), 2);
        assert_eq!(snap.fault_count(Fault::TransportTimeout), 3);
        assert_eq!(snap.fault_count(Fault::CommandError), 0);
    }

    #[test]
    fn snapshot_serialises_to_json() {
        let json = StatsSnapshot::default().to_json().unwrap();
        assert!(json.contains("\"overflow_count\":0"));
        assert!(json.contains("\"throughput_bps\":0"));
    }
}
