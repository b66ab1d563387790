//! Runtime diagnostics: log flood control and degraded-condition detection.
//!
//! The pipeline never decides remediation itself.  It exposes counters,
//! and [`HealthMonitor`] turns counter growth between two snapshots into a
//! [`Health`] verdict that the layer above (supervisor, operator tooling)
//! can act on.

use core::time::Duration;

use burster::Limiter;
use log::warn;

use crate::error::Fault;
use crate::stats::StatsSnapshot;

// ── Warning gate ──────────────────────────────────────────────

/// Token bucket in front of hot-path `warn!` calls.
///
/// A congested link can produce thousands of drops per second; the console
/// sees at most 10 per second with a burst of 10, and the number swallowed
/// in between is reported with the next one that gets through.
pub struct WarnGate {
    bucket: burster::TokenBucket<fn() -> Duration>,
    suppressed: u32,
}

impl Default for WarnGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WarnGate {
    pub fn new() -> Self {
        Self {
            bucket: burster::TokenBucket::new_with_time_provider(
                10,
                10, // 10 tokens per second, 10 burst capacity
                platform_now as fn() -> Duration,
            ),
            suppressed: 0,
        }
    }

    /// `true` if a warning may be logged now.
    pub fn allow(&mut self) -> bool {
        if self.bucket.try_consume(1).is_ok() {
            true
        } else {
            self.suppressed = self.suppressed.saturating_add(1);
            false
        }
    }

    /// Warnings swallowed since the last call.
    pub fn take_suppressed(&mut self) -> u32 {
        core::mem::take(&mut self.suppressed)
    }
}

/// Monotonic time since boot for the rate limiter.
#[cfg(target_os = "espidf")]
fn platform_now() -> Duration {
    let us = unsafe { esp_idf_sys::esp_timer_get_time() };
    Duration::from_micros(us as u64)
}

#[cfg(not(target_os = "espidf"))]
fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

// ── Health ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Nominal,
    /// At least one fault counter grew since the previous evaluation.
    /// Each entry is the fault and how many new occurrences were seen.
    Degraded(Vec<(Fault, u32)>),
}

impl Health {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Compares consecutive snapshots and reports which fault counters moved.
pub struct HealthMonitor {
    previous: StatsSnapshot,
}

impl HealthMonitor {
    pub fn new(baseline: StatsSnapshot) -> Self {
        Self { previous: baseline }
    }

    /// Replace the baseline without evaluating, e.g. after an operator reset.
    pub fn rebase(&mut self, baseline: StatsSnapshot) {
        self.previous = baseline;
    }

    pub fn evaluate(&mut self, current: StatsSnapshot) -> Health {
        let grown: Vec<(Fault, u32)> = Fault::ALL
            .iter()
            .filter_map(|&fault| {
                let delta = current
                    .fault_count(fault)
                    .wrapping_sub(self.previous.fault_count(fault));
                (delta > 0).then_some((fault, delta))
            })
            .collect();
        self.previous = current;

        if grown.is_empty() {
            Health::Nominal
        } else {
            Health::Degraded(grown)
        }
    }

    /// Evaluate and log the verdict in the `HEALTH | ...` format.
    pub fn evaluate_and_log(&mut self, current: StatsSnapshot) -> Health {
        let health = self.evaluate(current);
        if let Health::Degraded(faults) = &health {
            for (fault, delta) in faults {
                warn!("HEALTH | degraded | {} +{}", fault, delta);
            }
        }
        health
    }
}
