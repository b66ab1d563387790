//! Transmission worker: drains the transport queue on the protocol core.
//!
//! Loop: dequeue (bounded wait) → package → release the frame buffer →
//! hand the payload to the network transport → update counters.  The
//! bounded wait lets throughput and the periodic report refresh even when
//! no data flows.  A failed send is counted and forgotten; the same buffer
//! is never retried.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::queue::{Dequeued, TransportReceiver};
use crate::app::ports::{NetworkTransport, Packager, StatsSink};
use crate::config::PipelineConfig;
use crate::diagnostics::WarnGate;
use crate::stats::{Counter, StatsHandles, ThroughputMeter, WorkerSnapshot};
use crate::stream::frame::Frame;

/// Worker counters.
#[derive(Debug, Default)]
pub struct WorkerStats {
    frames_sent: Counter,
    bytes_sent: Counter,
    transmission_errors: Counter,
    throughput_bps: Counter,
}

impl WorkerStats {
    pub fn frames_sent(&self) -> u32 {
        self.frames_sent.get()
    }

    pub fn bytes_sent(&self) -> u32 {
        self.bytes_sent.get()
    }

    pub fn transmission_errors(&self) -> u32 {
        self.transmission_errors.get()
    }

    pub fn throughput_bps(&self) -> u32 {
        self.throughput_bps.get()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            frames_sent: self.frames_sent(),
            bytes_sent: self.bytes_sent(),
            transmission_errors: self.transmission_errors(),
            throughput_bps: self.throughput_bps(),
        }
    }

    pub fn reset(&self) {
        self.frames_sent.reset();
        self.bytes_sent.reset();
        self.transmission_errors.reset();
        self.throughput_bps.reset();
    }
}

/// Re-terminates each line so the receiving side can split the stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinePackager;

impl Packager for LinePackager {
    fn package(&mut self, frame: &Frame, out: &mut Vec<u8>) {
        out.extend_from_slice(frame.payload());
        out.push(b'\n');
    }
}

/// Wait and refresh intervals for the worker loop.
#[derive(Debug, Clone, Copy)]
pub struct WorkerTiming {
    pub dequeue_timeout: Duration,
    pub throughput_interval: Duration,
    pub report_interval: Duration,
}

impl From<&PipelineConfig> for WorkerTiming {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            dequeue_timeout: c.dequeue_timeout(),
            throughput_interval: c.throughput_interval(),
            report_interval: c.report_interval(),
        }
    }
}

/// What one iteration of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing arrived within the dequeue timeout.
    Idle,
    /// A payload of this many bytes went out.
    Sent(usize),
    /// The transport rejected the payload.
    Failed,
    /// All producers are gone and the queue is empty.
    Closed,
}

struct Reporter {
    sink: Box<dyn StatsSink + Send>,
    handles: StatsHandles,
    last: Instant,
}

pub struct TransmissionWorker<N, P = LinePackager> {
    rx: TransportReceiver,
    network: N,
    packager: P,
    timing: WorkerTiming,
    stats: Arc<WorkerStats>,
    meter: ThroughputMeter,
    scratch: Vec<u8>,
    reporter: Option<Reporter>,
    warn_gate: WarnGate,
}

impl<N: NetworkTransport> TransmissionWorker<N, LinePackager> {
    pub fn new(rx: TransportReceiver, network: N, timing: WorkerTiming) -> Self {
        Self::with_packager(rx, network, LinePackager, timing)
    }
}

impl<N: NetworkTransport, P: Packager> TransmissionWorker<N, P> {
    pub fn with_packager(rx: TransportReceiver, network: N, packager: P, timing: WorkerTiming) -> Self {
        Self {
            rx,
            network,
            packager,
            timing,
            stats: Arc::new(WorkerStats::default()),
            meter: ThroughputMeter::new(timing.throughput_interval, Instant::now()),
            scratch: Vec::new(),
            reporter: None,
            warn_gate: WarnGate::new(),
        }
    }

    /// Share counters created elsewhere (the pipeline registers them
    /// before the network transport exists).
    pub fn with_stats(mut self, stats: Arc<WorkerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Emit a full snapshot to `sink` every `report_interval`.
    pub fn with_reporter(mut self, sink: Box<dyn StatsSink + Send>, handles: StatsHandles) -> Self {
        self.reporter = Some(Reporter {
            sink,
            handles,
            last: Instant::now(),
        });
        self
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// One loop iteration.
    pub fn step(&mut self) -> StepOutcome {
        let outcome = match self.rx.poll(self.timing.dequeue_timeout) {
            Dequeued::Frame(frame) => self.transmit(frame),
            Dequeued::Empty => StepOutcome::Idle,
            Dequeued::Closed => StepOutcome::Closed,
        };
        self.housekeeping(Instant::now());
        outcome
    }

    /// Run until `stop` is raised or the queue closes.
    pub fn run(mut self, stop: &AtomicBool) {
        info!("Transmission worker running");
        while !stop.load(Ordering::Acquire) {
            if self.step() == StepOutcome::Closed {
                info!("Transport queue closed");
                break;
            }
        }
        info!(
            "Transmission worker stopped (frames={}, errors={})",
            self.stats.frames_sent(),
            self.stats.transmission_errors()
        );
    }

    fn transmit(&mut self, frame: Frame) -> StepOutcome {
        self.scratch.clear();
        self.packager.package(&frame, &mut self.scratch);
        // Payload is copied out; the slot goes back before network I/O.
        drop(frame);

        match self.network.send(&self.scratch) {
            Ok(()) => {
                let len = self.scratch.len();
                self.stats.frames_sent.incr();
                self.stats.bytes_sent.add(len);
                self.meter.record(len);
                StepOutcome::Sent(len)
            }
            Err(e) => {
                self.stats.transmission_errors.incr();
                if self.warn_gate.allow() {
                    warn!(
                        "Transmission failed: {} ({} warnings suppressed)",
                        e,
                        self.warn_gate.take_suppressed()
                    );
                }
                StepOutcome::Failed
            }
        }
    }

    fn housekeeping(&mut self, now: Instant) {
        if let Some(rate) = self.meter.poll(now) {
            self.stats.throughput_bps.set(rate);
        }
        if let Some(reporter) = self.reporter.as_mut() {
            if now.saturating_duration_since(reporter.last) >= self.timing.report_interval {
                reporter.last = now;
                reporter.sink.emit(&reporter.handles.snapshot());
            }
        }
    }
}
