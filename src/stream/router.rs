//! Priority router: classified frame → per-category handler.
//!
//! One handler slot per [`Category`], held in a fixed table indexed by the
//! category (closed set, no open-ended registry).  Handlers run inline in
//! the capture loop and receive the frame by value; they must not block
//! for more than a short bound.  A frame whose category has no handler is
//! dropped (buffer returned to the pool) and counted as unhandled.
//!
//! Frames are dispatched strictly in arrival order.  Priority is stamped
//! on the frame for downstream service decisions only.

use std::sync::Arc;

use log::debug;

use super::classify::classify_bytes;
use super::frame::{Category, Frame, RawFrame};
use crate::stats::{Counter, RouterSnapshot};

/// Per-category frame consumer.
pub type Handler = Box<dyn FnMut(Frame) + Send>;

/// Router counters.
#[derive(Debug, Default)]
pub struct RouterStats {
    routed: Counter,
    per_category: [Counter; Category::COUNT],
    unhandled: Counter,
}

impl RouterStats {
    pub fn routed(&self) -> u32 {
        self.routed.get()
    }

    pub fn unhandled(&self) -> u32 {
        self.unhandled.get()
    }

    pub fn count(&self, category: Category) -> u32 {
        self.per_category[category.index()].get()
    }

    pub fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            routed: self.routed(),
            per_category: core::array::from_fn(|i| self.per_category[i].get()),
            unhandled: self.unhandled(),
        }
    }

    pub fn reset(&self) {
        self.routed.reset();
        self.unhandled.reset();
        for c in &self.per_category {
            c.reset();
        }
    }
}

pub struct Router {
    handlers: [Option<Handler>; Category::COUNT],
    stats: Arc<RouterStats>,
    trace: bool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            handlers: Default::default(),
            stats: Arc::new(RouterStats::default()),
            trace: false,
        }
    }

    /// Install `handler` for `category`, returning the one it replaces.
    pub fn register(&mut self, category: Category, handler: Handler) -> Option<Handler> {
        self.handlers[category.index()].replace(handler)
    }

    pub fn unregister(&mut self, category: Category) -> Option<Handler> {
        self.handlers[category.index()].take()
    }

    pub fn is_registered(&self, category: Category) -> bool {
        self.handlers[category.index()].is_some()
    }

    /// Log every routed and unhandled frame at debug level.
    pub fn set_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.stats)
    }

    /// Classify `raw`, stamp it and hand it to its category's handler.
    pub fn dispatch(&mut self, raw: RawFrame) -> Category {
        let category = classify_bytes(&raw.buf);
        let frame = Frame::new(raw, category);

        self.stats.routed.incr();
        self.stats.per_category[category.index()].incr();

        match self.handlers[category.index()].as_mut() {
            Some(handler) => {
                if self.trace {
                    debug!(
                        "ROUTE | {} | pri={:?} | len={} | {}",
                        category,
                        frame.priority(),
                        frame.len(),
                        String::from_utf8_lossy(frame.payload())
                    );
                }
                handler(frame);
            }
            None => {
                self.stats.unhandled.incr();
                if self.trace {
                    debug!(
                        "ROUTE | {} | unhandled | {}",
                        category,
                        String::from_utf8_lossy(frame.payload())
                    );
                }
            }
        }
        category
    }
}
