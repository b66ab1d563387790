//! Frame and category types shared by the capture and transport stages.

use core::fmt;
use core::ops::Deref;
use std::time::Instant;

use serde::Serialize;

use crate::capture::pool::FrameBuf;

/// Stream category of one line on the shared link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Category {
    /// GNSS sentence (`$GPRMC`, `$GNGGA`, ...).
    Positioning = 0,
    /// Network status response (`+CREG`, `+CSQ`, `+COPS`, ...).
    ModemStatusLine = 1,
    /// Data-service (MQTT) response (`+CMQTT...`).
    DataServiceResponse = 2,
    /// `OK` / `ERROR` / `READY` or a command echo.
    ControlAck = 3,
    /// Anything else.
    Unclassified = 4,
}

impl Category {
    pub const COUNT: usize = 5;

    pub const ALL: [Category; Self::COUNT] = [
        Category::Positioning,
        Category::ModemStatusLine,
        Category::DataServiceResponse,
        Category::ControlAck,
        Category::Unclassified,
    ];

    /// Dense index for per-category tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Fixed category → priority mapping.
    pub const fn priority(self) -> Priority {
        match self {
            Self::Positioning => Priority::Highest,
            Self::ModemStatusLine | Self::DataServiceResponse => Priority::High,
            Self::ControlAck => Priority::Normal,
            Self::Unclassified => Priority::Lowest,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Positioning => "GPS",
            Self::ModemStatusLine => "LTE",
            Self::DataServiceResponse => "MQTT",
            Self::ControlAck => "STATUS",
            Self::Unclassified => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Service priority.  Lower discriminant = served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum Priority {
    Highest = 0,
    High = 1,
    Normal = 2,
    Lowest = 3,
}

/// A terminator-stripped line straight out of the assembler.
#[derive(Debug)]
pub struct RawFrame {
    pub buf: FrameBuf,
    pub captured_at: Instant,
}

/// One classified unit of link data.
///
/// Category and priority are fixed at classification; the payload is only
/// readable from here on.  Dropping the frame returns its buffer to the pool.
#[derive(Debug)]
pub struct Frame {
    category: Category,
    captured_at: Instant,
    buf: FrameBuf,
}

impl Frame {
    pub(crate) fn new(raw: RawFrame, category: Category) -> Self {
        Self {
            category,
            captured_at: raw.captured_at,
            buf: raw.buf,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn priority(&self) -> Priority {
        self.category.priority()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf
    }

    /// Payload as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.buf).ok()
    }

    /// Pool slot backing this frame.
    pub fn slot(&self) -> usize {
        self.buf.slot()
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}
