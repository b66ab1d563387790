//! Line assembler: ring bytes → terminator-delimited frames.
//!
//! ```text
//!            checkout ok             LF (non-empty)
//!   Idle ───────────────▶ Filling ───────────────▶ emit, Idle
//!    │                      │
//!    │ pool empty           │ capacity hit before LF
//!    ▼                      ▼
//!   Discarding(Starved)   Discarding(Oversize) ───▶ Idle on next LF
//! ```
//!
//! Carriage returns immediately before the LF are stripped.  Blank lines
//! never check out a buffer.  While discarding, nothing is forwarded: a
//! partial or garbled line is never presented as complete.

use std::sync::Arc;
use std::time::Instant;

use log::warn;

use super::pool::{FrameBuf, FramePool};
use crate::diagnostics::WarnGate;
use crate::stats::{AssemblerSnapshot, Counter};
use crate::stream::frame::RawFrame;

const TERMINATOR: u8 = b'\n';

/// Why the current line is being thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// No free frame buffer when the line started.
    Starved,
    /// Line longer than the frame capacity.
    Oversize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Filling,
    Discarding(DiscardReason),
}

/// Assembler counters.
#[derive(Debug, Default)]
pub struct AssemblerStats {
    frames: Counter,
    bytes: Counter,
    overrun_bytes: Counter,
    oversize_frames: Counter,
    resyncs: Counter,
}

impl AssemblerStats {
    pub fn frames(&self) -> u32 {
        self.frames.get()
    }

    pub fn overrun_bytes(&self) -> u32 {
        self.overrun_bytes.get()
    }

    pub fn oversize_frames(&self) -> u32 {
        self.oversize_frames.get()
    }

    pub fn snapshot(&self) -> AssemblerSnapshot {
        AssemblerSnapshot {
            frames: self.frames.get(),
            bytes: self.bytes.get(),
            overrun_bytes: self.overrun_bytes.get(),
            oversize_frames: self.oversize_frames.get(),
            resyncs: self.resyncs.get(),
        }
    }

    pub fn reset(&self) {
        self.frames.reset();
        self.bytes.reset();
        self.overrun_bytes.reset();
        self.oversize_frames.reset();
        self.resyncs.reset();
    }
}

pub struct FrameAssembler {
    pool: FramePool,
    state: AssemblerState,
    current: Option<FrameBuf>,
    /// Carriage returns seen at the tail of the current line but not yet
    /// stored; they only count as payload if more text follows.
    held_cr: usize,
    stats: Arc<AssemblerStats>,
    warn_gate: WarnGate,
}

impl FrameAssembler {
    pub fn new(pool: FramePool) -> Self {
        Self {
            pool,
            state: AssemblerState::Idle,
            current: None,
            held_cr: 0,
            stats: Arc::new(AssemblerStats::default()),
            warn_gate: WarnGate::new(),
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn stats(&self) -> Arc<AssemblerStats> {
        Arc::clone(&self.stats)
    }

    /// Bytes held in the frame being filled.
    pub fn pending_len(&self) -> usize {
        self.current.as_ref().map_or(0, |buf| buf.len())
    }

    /// Consume `data`, calling `emit` once per completed line, in order.
    pub fn feed(&mut self, mut data: &[u8], mut emit: impl FnMut(RawFrame)) {
        while !data.is_empty() {
            data = match self.state {
                AssemblerState::Idle => self.start_line(data),
                AssemblerState::Filling => self.fill(data, &mut emit),
                AssemblerState::Discarding(_) => self.discard(data),
            };
        }
    }

    /// Abandon any partial line.  Called after a command window consumed
    /// bytes the assembler never saw.
    pub fn resync(&mut self) {
        if self.current.take().is_some() {
            self.stats.resyncs.incr();
        }
        self.held_cr = 0;
        self.state = AssemblerState::Idle;
    }

    fn start_line<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        // Skip blank-line noise without touching the pool.
        let skip = data
            .iter()
            .take_while(|&&b| b == b'\r' || b == TERMINATOR)
            .count();
        let data = &data[skip..];
        if data.is_empty() {
            return data;
        }

        match self.pool.checkout() {
            Some(buf) => {
                self.current = Some(buf);
                self.state = AssemblerState::Filling;
            }
            None => {
                if self.warn_gate.allow() {
                    warn!(
                        "Frame pool exhausted, dropping line ({} warnings suppressed)",
                        self.warn_gate.take_suppressed()
                    );
                }
                self.state = AssemblerState::Discarding(DiscardReason::Starved);
            }
        }
        data
    }

    fn fill<'a>(&mut self, data: &'a [u8], emit: &mut impl FnMut(RawFrame)) -> &'a [u8] {
        let Some(buf) = self.current.as_mut() else {
            self.state = AssemblerState::Idle;
            return data;
        };

        let line_end = data.iter().position(|&b| b == TERMINATOR);
        let segment = &data[..line_end.unwrap_or(data.len())];
        let tail_cr = segment.iter().rev().take_while(|&&b| b == b'\r').count();
        let text_len = segment.len() - tail_cr;
        let needed = if text_len > 0 { self.held_cr + text_len } else { 0 };

        if needed > buf.remaining() {
            // No terminator within capacity: the line is lost.
            self.current = None;
            self.held_cr = 0;
            self.stats.oversize_frames.incr();
            if self.warn_gate.allow() {
                warn!(
                    "Oversize line discarded (capacity {} bytes, {} warnings suppressed)",
                    self.pool.frame_capacity(),
                    self.warn_gate.take_suppressed()
                );
            }
            self.state = AssemblerState::Discarding(DiscardReason::Oversize);
            return data;
        }

        if text_len > 0 {
            for _ in 0..self.held_cr {
                buf.extend_from_slice(b"\r");
            }
            buf.extend_from_slice(&segment[..text_len]);
            self.held_cr = 0;
        }
        self.held_cr += tail_cr;
        let Some(end) = line_end else {
            return &data[segment.len()..];
        };

        self.held_cr = 0;
        self.state = AssemblerState::Idle;
        if let Some(mut buf) = self.current.take() {
            buf.trim_trailing_cr();
            if !buf.is_empty() {
                self.stats.frames.incr();
                self.stats.bytes.add(buf.len());
                emit(RawFrame {
                    buf,
                    captured_at: Instant::now(),
                });
            }
        }
        &data[end + 1..]
    }

    fn discard<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        let (dropped, rest) = match data.iter().position(|&b| b == TERMINATOR) {
            Some(end) => {
                self.state = AssemblerState::Idle;
                (end + 1, &data[end + 1..])
            }
            None => (data.len(), &data[data.len()..]),
        };
        self.stats.overrun_bytes.add(dropped);
        rest
    }
}
