//! Category handlers registered with the router at start-up.

use std::sync::Arc;

use log::{debug, warn};

use super::nmea::{verify_checksum, Checksum};
use crate::config::EnqueuePolicy;
use crate::diagnostics::WarnGate;
use crate::stats::Counter;
use crate::stream::frame::Frame;
use crate::stream::router::Handler;
use crate::transport::queue::{EnqueueError, TransportSender};

/// Counters for the positioning forwarder.  Queue drops are counted by
/// the queue itself.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    forwarded: Counter,
    checksum_rejects: Counter,
}

impl ForwarderStats {
    pub fn forwarded(&self) -> u32 {
        self.forwarded.get()
    }

    pub fn checksum_rejects(&self) -> u32 {
        self.checksum_rejects.get()
    }
}

/// Positioning handler: submit each sentence to the transport queue.
///
/// With `verify_checksum` set, sentences whose `*hh` trailer does not
/// match are counted and released instead of forwarded.
pub fn positioning_forwarder(
    tx: TransportSender,
    policy: EnqueuePolicy,
    verify_checksum_trailer: bool,
    stats: Arc<ForwarderStats>,
) -> Handler {
    let mut warn_gate = WarnGate::new();
    Box::new(move |frame: Frame| {
        if verify_checksum_trailer {
            let verdict = verify_checksum(frame.payload());
            if !verdict.is_acceptable() {
                stats.checksum_rejects.incr();
                if let Checksum::Mismatch { expected, computed } = verdict {
                    debug!("GPS | checksum mismatch | expected={:02X} computed={:02X}", expected, computed);
                }
                return;
            }
        }
        match tx.submit(frame, policy) {
            Ok(()) => stats.forwarded.incr(),
            Err(EnqueueError::TimedOut) => {
                if warn_gate.allow() {
                    warn!(
                        "Transport queue full, frame dropped ({} warnings suppressed)",
                        warn_gate.take_suppressed()
                    );
                }
            }
            Err(EnqueueError::Disconnected) => {
                if warn_gate.allow() {
                    warn!("Transport queue closed, frame dropped");
                }
            }
        }
    })
}

/// ControlAck handler: acknowledgements outside a command window carry no
/// work, they are only traced.
pub fn control_ack_logger() -> Handler {
    Box::new(|frame: Frame| {
        debug!("STATUS | {}", String::from_utf8_lossy(frame.payload()));
    })
}
