//! Port traits: the boundary between the pipeline and the outside world.
//!
//! ```text
//!   UART driver ──▶ LinkRx / LinkTx ──▶ Harvester, CommandEngine
//!   Pipeline    ──▶ NetworkTransport ──▶ MQTT session (connectivity stack)
//!   Pipeline    ──▶ StatsSink        ──▶ console / telemetry
//! ```
//!
//! Adapters implement these traits; the pipeline consumes them through
//! generics or trait objects and never touches a driver directly.

use core::fmt;
use core::time::Duration;

use crate::error::LinkError;
use crate::stats::StatsSnapshot;
use crate::stream::frame::Frame;

// ───────────────────────────────────────────────────────────────
// Physical link (driven adapter: UART ↔ pipeline)
// ───────────────────────────────────────────────────────────────

/// Receive half of the shared serial link.
pub trait LinkRx: Send {
    /// Read whatever is available, waiting at most `timeout`.
    /// `Ok(0)` means nothing arrived in time.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError>;
}

/// Transmit half of the shared serial link.
pub trait LinkTx: Send {
    /// Write bytes, returning how many the driver accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, LinkError>;

    /// Block until queued bytes have left the driver.
    fn flush(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Write all of `data` or fail.
    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let written = self.write(data)?;
        if written == data.len() {
            Ok(())
        } else {
            Err(LinkError::ShortWrite)
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Network transport (driven adapter: pipeline → connectivity stack)
// ───────────────────────────────────────────────────────────────

/// Hands one packaged payload to the network.  May block up to its own
/// transport-defined timeout.  Retrying is the transport's business.
pub trait NetworkTransport {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;
}

impl<F> NetworkTransport for F
where
    F: FnMut(&[u8]) -> Result<(), TransportError>,
{
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self(payload)
    }
}

/// Converts a frame into the bytes the network transport expects.
pub trait Packager {
    /// Append the payload for `frame` to `out` (which arrives empty).
    fn package(&mut self, frame: &Frame, out: &mut Vec<u8>);
}

// ───────────────────────────────────────────────────────────────
// Statistics sink (driven adapter: pipeline → operator tooling)
// ───────────────────────────────────────────────────────────────

/// Receives periodic read-only statistics snapshots.
pub trait StatsSink {
    fn emit(&mut self, snapshot: &StatsSnapshot);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`NetworkTransport::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No bearer / session right now.
    NotConnected,
    /// Peer or broker refused the payload.
    Rejected,
    /// The transport's own timeout expired.
    Timeout,
    /// Generic I/O failure.
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Rejected => write!(f, "rejected"),
            Self::Timeout => write!(f, "timed out"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}
