//! Pipeline configuration parameters
//!
//! All tunable sizes and timeouts for the capture → transport pipeline.
//! Persisting the blob is somebody else's job; this module only defines
//! the shape, the defaults, range validation and the postcard encoding.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest pool that still lets the assembler fill one frame while the
/// previous one is queued and another is being transmitted.
pub const MIN_POOL_SLOTS: u8 = 3;

/// Frame payload bounds (bytes).
pub const MIN_FRAME_CAPACITY: u16 = 64;
pub const MAX_FRAME_CAPACITY: u16 = 4096;

/// Upper bound on any wait inside the capture loop.
pub const MAX_CAPTURE_WAIT_MS: u32 = 100;

/// What the positioning handler does when the transport queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnqueuePolicy {
    /// Wait up to `timeout_ms` for room, then drop.
    Block { timeout_ms: u32 },
    /// Drop immediately.
    DropNewest,
}

impl EnqueuePolicy {
    /// Time the producer may wait for room in the queue.
    pub fn timeout(self) -> Duration {
        match self {
            Self::Block { timeout_ms } => Duration::from_millis(u64::from(timeout_ms)),
            Self::DropNewest => Duration::ZERO,
        }
    }
}

/// Core pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    // --- Link ---
    /// UART baud rate shared by GNSS output and AT traffic
    pub baud_rate: u32,
    /// ESP32 GPIO driving the modem RX line
    pub tx_pin: u8,
    /// ESP32 GPIO reading the modem TX line
    pub rx_pin: u8,

    // --- Capture ---
    /// Ring buffer capacity between harvester and assembler (bytes)
    pub ring_capacity: u32,
    /// Number of frame buffers in the pool
    pub pool_slots: u8,
    /// Payload capacity of each frame buffer (bytes)
    pub frame_capacity: u16,
    /// Ring read wait inside the capture loop (milliseconds)
    pub capture_read_timeout_ms: u32,
    /// Driver read wait inside the harvester (milliseconds)
    pub harvest_poll_ms: u32,

    // --- Transport ---
    /// Transport queue depth (frames)
    pub queue_depth: u16,
    /// Behaviour of the positioning handler on a full queue
    pub enqueue_policy: EnqueuePolicy,
    /// Transmission worker dequeue wait (milliseconds)
    pub dequeue_timeout_ms: u32,
    /// Throughput recomputation interval (milliseconds)
    pub throughput_interval_ms: u32,
    /// Statistics report interval (seconds)
    pub report_interval_secs: u32,

    // --- Command ---
    /// Default response timeout for AT commands (milliseconds)
    pub command_timeout_ms: u32,
    /// Settle delay for commands sent without an expected reply (milliseconds)
    pub command_settle_ms: u32,
    /// Bytes held back for the capture path during command windows
    pub deferred_capacity: u32,

    // --- Handlers ---
    /// Drop positioning sentences whose `*hh` checksum does not match
    pub verify_nmea_checksum: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // Link
            baud_rate: 115_200,
            tx_pin: 18,
            rx_pin: 17,

            // Capture
            ring_capacity: 16 * 1024,
            pool_slots: 4,
            frame_capacity: 512,
            capture_read_timeout_ms: 20,
            harvest_poll_ms: 10,

            // Transport
            queue_depth: 16,
            enqueue_policy: EnqueuePolicy::Block { timeout_ms: 100 },
            dequeue_timeout_ms: 100,
            throughput_interval_ms: 1000, // 1 Hz
            report_interval_secs: 60,     // 1/min

            // Command
            command_timeout_ms: 3000,
            command_settle_ms: 100,
            deferred_capacity: 2048,

            // Handlers
            verify_nmea_checksum: false,
        }
    }
}

impl PipelineConfig {
    /// Range-check every field.  Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::ValidationFailed("baud_rate must be non-zero"));
        }
        if self.ring_capacity < u32::from(self.frame_capacity) {
            return Err(ConfigError::ValidationFailed(
                "ring_capacity must hold at least one frame",
            ));
        }
        if self.pool_slots < MIN_POOL_SLOTS {
            return Err(ConfigError::ValidationFailed("pool_slots below 3"));
        }
        if !(MIN_FRAME_CAPACITY..=MAX_FRAME_CAPACITY).contains(&self.frame_capacity) {
            return Err(ConfigError::ValidationFailed(
                "frame_capacity outside 64..=4096",
            ));
        }
        if self.capture_read_timeout_ms == 0 || self.capture_read_timeout_ms > MAX_CAPTURE_WAIT_MS
        {
            return Err(ConfigError::ValidationFailed(
                "capture_read_timeout_ms outside 1..=100",
            ));
        }
        if self.harvest_poll_ms == 0 || self.harvest_poll_ms > MAX_CAPTURE_WAIT_MS {
            return Err(ConfigError::ValidationFailed("harvest_poll_ms outside 1..=100"));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::ValidationFailed("queue_depth must be non-zero"));
        }
        if self.dequeue_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "dequeue_timeout_ms must be non-zero",
            ));
        }
        if self.throughput_interval_ms < 100 {
            return Err(ConfigError::ValidationFailed(
                "throughput_interval_ms below 100",
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "command_timeout_ms must be non-zero",
            ));
        }
        if self.deferred_capacity < u32::from(self.frame_capacity) {
            return Err(ConfigError::ValidationFailed(
                "deferred_capacity must hold at least one frame",
            ));
        }
        Ok(())
    }

    /// Decode a persisted blob and validate it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        Ok(config)
    }

    /// Encode for persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Corrupted)
    }

    pub fn capture_read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.capture_read_timeout_ms))
    }

    pub fn harvest_poll(&self) -> Duration {
        Duration::from_millis(u64::from(self.harvest_poll_ms))
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.dequeue_timeout_ms))
    }

    pub fn throughput_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.throughput_interval_ms))
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.report_interval_secs))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.command_timeout_ms))
    }

    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(u64::from(self.command_settle_ms))
    }
}

/// Errors from loading or validating a [`PipelineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored blob failed deserialization.
    Corrupted,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Corrupted => Self::Config("stored config corrupted"),
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = PipelineConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.pool_slots >= MIN_POOL_SLOTS);
        assert!(c.capture_read_timeout_ms <= MAX_CAPTURE_WAIT_MS);
        assert!(c.ring_capacity >= u32::from(c.frame_capacity) * u32::from(c.pool_slots));
    }

    #[test]
    fn undersized_pool_is_rejected() {
        let c = PipelineConfig {
            pool_slots: 2,
            ..PipelineConfig::default()
        };
        assert_eq!(
            c.validate(),
            Err(ConfigError::ValidationFailed("pool_slots below 3"))
        );
    }

    #[test]
    fn long_capture_wait_is_rejected() {
        let c = PipelineConfig {
            capture_read_timeout_ms: 250,
            ..PipelineConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn frame_capacity_bounds() {
        for (cap, ok) in [(63, false), (64, true), (4096, true), (4097, false)] {
            let c = PipelineConfig {
                frame_capacity: cap,
                ..PipelineConfig::default()
            };
            assert_eq!(c.validate().is_ok(), ok, "frame_capacity {cap}");
        }
    }

    #[test]
    fn enqueue_policy_timeout() {
        assert_eq!(
            EnqueuePolicy::Block { timeout_ms: 25 }.timeout(),
            Duration::from_millis(25)
        );
        assert_eq!(EnqueuePolicy::DropNewest.timeout(), Duration::ZERO);
    }

    #[test]
    fn serde_roundtrip() {
        let c = PipelineConfig {
            enqueue_policy: EnqueuePolicy::DropNewest,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        let c2: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = PipelineConfig::default();
        let bytes = c.to_bytes().unwrap();
        let c2 = PipelineConfig::from_bytes(&bytes).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn truncated_blob_is_corrupted() {
        let bytes = PipelineConfig::default().to_bytes().unwrap();
        assert_eq!(
            PipelineConfig::from_bytes(&bytes[..bytes.len() / 2]),
            Err(ConfigError::Corrupted)
        );
    }
}
