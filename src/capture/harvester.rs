//! Byte harvester: link receive path → ring buffer.
//!
//! On ESP-IDF the UART ISR belongs to the driver, which moves FIFO bytes
//! into its own rx buffer.  The harvester runs in the UART event task right
//! behind it and does the minimum: copy into the ring, never block on the
//! consumer, never allocate.  Everything else happens in the capture loop.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use super::ring::{RingMonitor, RingProducer};
use crate::app::ports::LinkRx;
use crate::diagnostics::WarnGate;
use crate::stats::Counter;

/// Bytes moved per driver read; matches the UART rx FIFO threshold.
pub const HARVEST_CHUNK: usize = 128;

/// Back-off after a driver error so a dead link does not spin the core.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

pub struct Harvester {
    producer: RingProducer,
    link_errors: Arc<Counter>,
    warn_gate: WarnGate,
}

impl Harvester {
    pub fn new(producer: RingProducer) -> Self {
        Self {
            producer,
            link_errors: Arc::new(Counter::new()),
            warn_gate: WarnGate::new(),
        }
    }

    /// Driver read failures seen so far.
    pub fn link_errors(&self) -> Arc<Counter> {
        Arc::clone(&self.link_errors)
    }

    pub fn monitor(&self) -> RingMonitor {
        self.producer.monitor()
    }

    /// Interrupt-side entry point.  Returns the number of bytes the ring took.
    #[inline]
    pub fn on_receive(&mut self, data: &[u8]) -> usize {
        self.producer.push(data)
    }

    /// Drain `rx` into the ring until `stop` is raised.
    pub fn run<R: LinkRx>(mut self, mut rx: R, poll: Duration, stop: &AtomicBool) {
        let mut chunk = [0u8; HARVEST_CHUNK];
        info!("Harvester running");
        while !stop.load(Ordering::Acquire) {
            match rx.read(&mut chunk, poll) {
                Ok(0) => {}
                Ok(n) => {
                    let accepted = self.on_receive(&chunk[..n]);
                    if accepted < n && self.warn_gate.allow() {
                        warn!(
                            "Ring overflow, dropped {} bytes ({} warnings suppressed)",
                            n - accepted,
                            self.warn_gate.take_suppressed()
                        );
                    }
                }
                Err(e) => {
                    self.link_errors.incr();
                    if self.warn_gate.allow() {
                        warn!(
                            "Link read failed: {} ({} warnings suppressed)",
                            e,
                            self.warn_gate.take_suppressed()
                        );
                    }
                    std::thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        info!("Harvester stopped");
    }
}
