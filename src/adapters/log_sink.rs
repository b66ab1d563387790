//! Log-based statistics sink adapter.
//!
//! Implements [`StatsSink`] by writing one `STATS | ...` line per snapshot
//! to the ESP-IDF logger (UART / USB-CDC console in production).  A
//! telemetry uplink would implement the same trait.

use log::{info, warn};

use crate::app::ports::StatsSink;
use crate::stats::StatsSnapshot;
use crate::stream::frame::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsFormat {
    /// Compact `key=value` line for humans.
    Text,
    /// Whole snapshot as JSON for log scrapers.
    Json,
}

/// Adapter that logs every snapshot to the serial console.
pub struct LogStatsSink {
    format: StatsFormat,
}

impl Default for LogStatsSink {
    fn default() -> Self {
        Self::new(StatsFormat::Text)
    }
}

impl LogStatsSink {
    pub fn new(format: StatsFormat) -> Self {
        Self { format }
    }
}

impl StatsSink for LogStatsSink {
    fn emit(&mut self, s: &StatsSnapshot) {
        match self.format {
            StatsFormat::Text => info!("{}", render_text(s)),
            StatsFormat::Json => match s.to_json() {
                Ok(json) => info!("STATS | {}", json),
                Err(e) => warn!("STATS | serialisation failed: {}", e),
            },
        }
    }
}

/// One-line text rendering of a snapshot.
pub fn render_text(s: &StatsSnapshot) -> String {
    format!(
        "STATS | ring={}/{}B ovf={} drop={}B | pool={}/{} exh={} | \
         frames={} overrun={}B oversize={} | {}={} {}={} {}={} {}={} {}={} | \
         q={} tx={} txdrop={} | sent={} err={} {}B/s | cmd={}/{} to={} | yields={}",
        s.ring.buffered,
        s.ring.capacity,
        s.ring.overflow_count,
        s.ring.dropped_bytes,
        s.pool.in_use,
        s.pool.slots,
        s.pool.exhausted_count,
        s.assembler.frames,
        s.assembler.overrun_bytes,
        s.assembler.oversize_frames,
        Category::Positioning,
        s.router.count(Category::Positioning),
        Category::ModemStatusLine,
        s.router.count(Category::ModemStatusLine),
        Category::DataServiceResponse,
        s.router.count(Category::DataServiceResponse),
        Category::ControlAck,
        s.router.count(Category::ControlAck),
        Category::Unclassified,
        s.router.count(Category::Unclassified),
        s.transport.depth,
        s.transport.enqueued,
        s.transport.transport_drops,
        s.worker.frames_sent,
        s.worker.transmission_errors,
        s.worker.throughput_bps,
        s.command.matched,
        s.command.sent,
        s.command.timeouts,
        s.capture_yields,
    )
}
