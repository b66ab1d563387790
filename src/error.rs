//! Unified error types for the tracker pipeline.
//!
//! Two layers:
//! - [`Error`] is returned by fallible operations and is fatal only at
//!   start-up (allocation, link acquisition, thread spawn).
//! - [`Fault`] names a condition the running loops recover from locally by
//!   dropping the offending unit of data and bumping a counter.  Faults are
//!   never returned through `Result`; they show up in the statistics.
//!
//! All variants are `Copy` so they can cross the capture/transmission
//! contexts without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level pipeline error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A fixed-size structure could not be allocated or a loop could not start.
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
    /// The physical link failed.
    Link(LinkError),
    /// A command/response exchange did not succeed.
    Command(CommandError),
    /// A pipeline loop ended abnormally.
    Task(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Task(msg) => write!(f, "task: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The driver reported a read or write failure.
    Io,
    /// Fewer bytes were written than requested.
    ShortWrite,
    /// The other end of the link is gone (simulation / shutdown).
    Closed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O failure"),
            Self::ShortWrite => write!(f, "short write"),
            Self::Closed => write!(f, "link closed"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// No expected substring or error marker before the deadline.
    TimedOut,
    /// The modem answered with an error marker (`ERROR`, `+CME ERROR`, ...).
    ErrorSeen,
    /// The command could not be written to the link.
    Link(LinkError),
    /// Command text was empty or contained a line terminator.
    Invalid,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "timed out"),
            Self::ErrorSeen => write!(f, "modem reported error"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Invalid => write!(f, "invalid command text"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

impl From<LinkError> for CommandError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Locally recovered faults
// ---------------------------------------------------------------------------

/// Conditions the loops absorb by dropping data.  Each one has exactly one
/// counter in [`StatsSnapshot`](crate::stats::StatsSnapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Fault {
    /// Ring buffer full, newest bytes dropped.
    OverflowDrop,
    /// No free frame buffer when a line started.
    PoolExhausted,
    /// Line exceeded the frame capacity before its terminator.
    OversizeFrame,
    /// Frame had no registered handler for its category.
    ClassificationMiss,
    /// Transport queue stayed full for the whole enqueue timeout.
    TransportTimeout,
    /// Network transport rejected a payload.
    TransmissionFailure,
    /// Command window ended without a matching response.
    CommandTimeout,
    /// Modem answered a command with an error marker.
    CommandError,
}

impl Fault {
    pub const ALL: [Fault; 8] = [
        Fault::OverflowDrop,
        Fault::PoolExhausted,
        Fault::OversizeFrame,
        Fault::ClassificationMiss,
        Fault::TransportTimeout,
        Fault::TransmissionFailure,
        Fault::CommandTimeout,
        Fault::CommandError,
    ];
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverflowDrop => write!(f, "ring overflow"),
            Self::PoolExhausted => write!(f, "frame pool exhausted"),
            Self::OversizeFrame => write!(f, "oversize frame"),
            Self::ClassificationMiss => write!(f, "unhandled frame"),
            Self::TransportTimeout => write!(f, "transport queue timeout"),
            Self::TransmissionFailure => write!(f, "transmission failure"),
            Self::CommandTimeout => write!(f, "command timeout"),
            Self::CommandError => write!(f, "command error"),
        }
    }
}

impl From<CommandError> for Fault {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::ErrorSeen => Self::CommandError,
            _ => Self::CommandTimeout,
        }
    }
}
