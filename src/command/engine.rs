//! Synchronous AT command/response engine.
//!
//! ```text
//!   Idle ──write──▶ AwaitingResponse ──┬──▶ Matched     (expected text seen)
//!                                      ├──▶ ErrorSeen   ("ERROR" seen)
//!                                      └──▶ TimedOut    (deadline passed)
//! ```
//!
//! The engine holds the link token for the whole window.  Response lines
//! accumulate into a fixed-capacity string; GNSS sentences that arrive in
//! the middle of a response are handed back to the capture path through
//! the link's deferred FIFO instead of being swallowed.
//!
//! The engine never retries on its own; see [`send_with_retries`].
//!
//! [`send_with_retries`]: super::send_with_retries

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use heapless::String as HString;
use heapless::Vec as HVec;
use log::debug;

use super::link::{LinkPort, SharedLink};
use crate::error::CommandError;
use crate::stats::{CommandSnapshot, Counter};
use crate::stream::classify::classify_bytes;
use crate::stream::frame::Category;

/// Response text capacity; anything beyond is dropped.
pub const RESPONSE_CAP: usize = 512;

/// Longest single line the engine will inspect for deferral.
const LINE_CAP: usize = 512;

/// Generic error marker; also matches `+CME ERROR` and `+CMS ERROR`.
const ERROR_MARKER: &str = "ERROR";

/// Upper bound on one ring wait while a response is pending.
const POLL_SLICE: Duration = Duration::from_millis(10);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

pub type ResponseText = HString<RESPONSE_CAP>;

/// One AT command invocation.
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest<'a> {
    /// Command text without the line terminator, e.g. `AT+CSQ`.
    pub command: &'a str,
    /// Substring that marks success.  `None` = fire-and-forget.
    pub expect: Option<&'a str>,
    pub timeout: Duration,
    /// Extra attempts for caller-level retry (0 = single attempt).
    pub retries: u8,
}

impl<'a> CommandRequest<'a> {
    /// Expect `OK` within one second, no retries.
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            expect: Some("OK"),
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
        }
    }

    pub fn expect(mut self, expect: &'a str) -> Self {
        self.expect = Some(expect);
        self
    }

    /// Succeed after the settle delay without reading a reply.
    pub fn no_reply(mut self) -> Self {
        self.expect = None;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Idle,
    AwaitingResponse,
    Matched,
    TimedOut,
    ErrorSeen,
}

/// Successful reply.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    /// Response lines (echo included), `\n`-separated, CRs stripped.
    pub text: ResponseText,
    pub elapsed: Duration,
    /// More response text arrived than [`RESPONSE_CAP`] holds.
    pub truncated: bool,
}

impl CommandResponse {
    /// Non-empty response lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines().filter(|l| !l.is_empty())
    }

    /// First line starting with `prefix`, e.g. `"+CSQ:"`.
    pub fn line_starting_with(&self, prefix: &str) -> Option<&str> {
        self.lines().find(|l| l.starts_with(prefix))
    }
}

/// Command engine counters.
#[derive(Debug, Default)]
pub struct CommandStats {
    sent: Counter,
    matched: Counter,
    timeouts: Counter,
    errors_seen: Counter,
}

impl CommandStats {
    pub fn snapshot(&self) -> CommandSnapshot {
        CommandSnapshot {
            sent: self.sent.get(),
            matched: self.matched.get(),
            timeouts: self.timeouts.get(),
            errors_seen: self.errors_seen.get(),
        }
    }

    pub fn reset(&self) {
        self.sent.reset();
        self.matched.reset();
        self.timeouts.reset();
        self.errors_seen.reset();
    }
}

pub struct CommandEngine {
    link: SharedLink,
    settle: Duration,
    state: CommandState,
    stats: Arc<CommandStats>,
}

impl CommandEngine {
    pub fn new(link: SharedLink, settle: Duration) -> Self {
        Self {
            link,
            settle,
            state: CommandState::Idle,
            stats: Arc::new(CommandStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<CommandStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Outcome of the last invocation.
    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn stats(&self) -> Arc<CommandStats> {
        Arc::clone(&self.stats)
    }

    /// Run one request/response cycle.  Blocks the caller for at most the
    /// request timeout plus the wait for the link token.
    pub fn execute(&mut self, req: &CommandRequest<'_>) -> Result<CommandResponse, CommandError> {
        if req.command.is_empty() || req.command.contains(['\r', '\n']) {
            return Err(CommandError::Invalid);
        }

        let started = Instant::now();
        let mut port = self.link.acquire();
        port.begin_window();
        self.state = CommandState::AwaitingResponse;
        self.stats.sent.incr();
        debug!("AT >> {}", req.command);

        if let Err(e) = port
            .write(req.command.as_bytes())
            .and_then(|()| port.write(b"\r\n"))
        {
            self.state = CommandState::Idle;
            return Err(CommandError::Link(e));
        }

        let Some(expect) = req.expect else {
            // Fire-and-forget: let the capture path have the link back
            // while the modem digests the command.
            drop(port);
            thread::sleep(self.settle);
            self.state = CommandState::Matched;
            self.stats.matched.incr();
            return Ok(CommandResponse {
                text: ResponseText::new(),
                elapsed: started.elapsed(),
                truncated: false,
            });
        };

        let deadline = started + req.timeout;
        let mut acc = ResponseAccumulator::new();
        let mut chunk = [0u8; 64];
        let outcome = loop {
            if acc.contains(expect) {
                break CommandState::Matched;
            }
            if acc.contains(ERROR_MARKER) {
                break CommandState::ErrorSeen;
            }
            let now = Instant::now();
            if now >= deadline {
                break CommandState::TimedOut;
            }
            let n = port.read_response(&mut chunk, (deadline - now).min(POLL_SLICE));
            acc.feed(&chunk[..n], &mut port);
        };
        acc.finish(&mut port);
        drop(port);

        self.state = outcome;
        debug!("AT << {:?} ({:?}) {:?}", outcome, started.elapsed(), acc.text.as_str());
        match outcome {
            CommandState::Matched => {
                self.stats.matched.incr();
                Ok(CommandResponse {
                    text: acc.text,
                    elapsed: started.elapsed(),
                    truncated: acc.truncated,
                })
            }
            CommandState::ErrorSeen => {
                self.stats.errors_seen.incr();
                Err(CommandError::ErrorSeen)
            }
            _ => {
                self.stats.timeouts.incr();
                Err(CommandError::TimedOut)
            }
        }
    }
}

// ── Response accumulation ─────────────────────────────────────

struct ResponseAccumulator {
    text: ResponseText,
    line: HVec<u8, LINE_CAP>,
    line_overflow: bool,
    truncated: bool,
}

impl ResponseAccumulator {
    fn new() -> Self {
        Self {
            text: ResponseText::new(),
            line: HVec::new(),
            line_overflow: false,
            truncated: false,
        }
    }

    /// Match against the collected text and the unfinished line.  An
    /// unfinished `$` sentence is not response text until its terminator
    /// shows what it is.
    fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
            || (self.line.first() != Some(&b'$')
                && core::str::from_utf8(&self.line).is_ok_and(|l| l.contains(needle)))
    }

    fn feed(&mut self, bytes: &[u8], port: &mut LinkPort) {
        for &b in bytes {
            if b == b'\n' {
                self.end_line(port);
            } else if self.line.push(b).is_err() {
                self.line_overflow = true;
            }
        }
    }

    fn end_line(&mut self, port: &mut LinkPort) {
        let line = core::mem::take(&mut self.line);
        let overflow = core::mem::take(&mut self.line_overflow);
        let body = trim_cr(&line);
        if !overflow && classify_bytes(body) == Category::Positioning {
            port.defer(&line);
            port.defer(b"\n");
        } else if !body.is_empty() {
            self.append_text(body);
            self.append_text(b"\n");
        }
    }

    /// Close the window: an unfinished GNSS sentence goes back to the
    /// capture path, which will see the rest of it in the ring.
    fn finish(&mut self, port: &mut LinkPort) {
        let line = core::mem::take(&mut self.line);
        let overflow = core::mem::take(&mut self.line_overflow);
        if line.first() == Some(&b'$') && !overflow {
            port.defer(&line);
        } else {
            self.append_text(trim_cr(&line));
        }
    }

    fn append_text(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        for ch in text.chars() {
            if self.text.push(ch).is_err() {
                self.truncated = true;
                return;
            }
        }
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    &line[..end]
}
