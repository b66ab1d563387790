//! Tracker firmware: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  UartRx / UartTx     LogStatsSink      LogNetwork            │
//! │  (LinkRx / LinkTx)   (StatsSink)       (NetworkTransport)    │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  App core:  Harvester → ring → CaptureLoop → Router          │
//! │  Pro core:  transport queue → TransmissionWorker             │
//! │  main:      CommandEngine (modem bring-up, status polls)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::thread;
use std::time::Duration;

use anyhow::Result;
use esp_idf_hal::peripherals::Peripherals;
use log::{info, warn};

use trackmux::adapters::log_sink::{LogStatsSink, StatsFormat};
use trackmux::adapters::network::LogNetwork;
use trackmux::adapters::uart;
use trackmux::app::modem_status::ModemStatusTracker;
use trackmux::command::engine::{CommandEngine, CommandRequest};
use trackmux::command::send_with_retries;
use trackmux::config::PipelineConfig;
use trackmux::diagnostics::HealthMonitor;
use trackmux::Pipeline;

/// Modem status poll period.
const STATUS_POLL: Duration = Duration::from_secs(30);

// ── Modem bring-up ────────────────────────────────────────────

/// Wake the modem, check the SIM and route GNSS output onto the shared UART.
fn bring_up_modem(engine: &mut CommandEngine, tracker: &ModemStatusTracker, timeout: Duration) {
    let steps = [
        CommandRequest::new("AT").timeout(timeout).retries(5),
        CommandRequest::new("AT+CPIN?").expect("READY").timeout(timeout).retries(2),
        CommandRequest::new("AT+CGNSSPWR=1").timeout(timeout).retries(2),
        CommandRequest::new("AT+CGNSSTST=1").timeout(timeout).retries(1),
        CommandRequest::new("AT+CGNSSPORTSWITCH=0,1").timeout(timeout).retries(1),
    ];
    for req in &steps {
        match send_with_retries(engine, req) {
            Ok(resp) => {
                tracker.apply_response(&resp.text);
                info!("MODEM | {} | ok ({} ms)", req.command, resp.elapsed.as_millis());
            }
            Err(e) => warn!("MODEM | {} | {}", req.command, e),
        }
    }
}

fn poll_modem_status(engine: &mut CommandEngine, tracker: &ModemStatusTracker, timeout: Duration) {
    for command in ["AT+CSQ", "AT+CREG?", "AT+COPS?"] {
        let req = CommandRequest::new(command).timeout(timeout);
        match engine.execute(&req) {
            Ok(resp) => {
                tracker.apply_response(&resp.text);
            }
            Err(e) => warn!("MODEM | {} | {}", command, e),
        }
    }
    let status = tracker.status();
    info!(
        "MODEM | rssi={:?}dBm | reg={:?} | op={} | sim={:?}",
        status.rssi_dbm,
        status.registration,
        status.operator.as_deref().unwrap_or("-"),
        status.sim_ready,
    );
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  trackmux v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    // Persisted configuration is owned by the storage collaborator;
    // the firmware boots with defaults.
    let config = PipelineConfig::default();
    let command_timeout = config.command_timeout();

    // ── 3. Link and pipeline ──────────────────────────────────
    let peripherals = Peripherals::take()?;
    let (link_rx, link_tx) = uart::open(peripherals.uart1, &config)?;

    let mut pipeline = Pipeline::init(config, link_tx)?;
    let tracker = pipeline.register_defaults();
    pipeline.set_stats_sink(Box::new(LogStatsSink::new(StatsFormat::Text)));

    let mut engine = pipeline.command_engine();
    let stats = pipeline.stats();
    let running = pipeline.start(link_rx, LogNetwork::new("tracker/gps"))?;

    // ── 4. Modem bring-up ─────────────────────────────────────
    bring_up_modem(&mut engine, &tracker, command_timeout);

    // ── 5. Supervisor loop ────────────────────────────────────
    let mut health = HealthMonitor::new(stats.snapshot());
    info!("System ready. Entering supervisor loop.");

    while running.is_running() {
        thread::sleep(STATUS_POLL);
        poll_modem_status(&mut engine, &tracker, command_timeout);
        health.evaluate_and_log(running.snapshot());
    }

    running.shutdown()?;
    Ok(())
}
