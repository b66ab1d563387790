//! Command/response windows on the shared link.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use trackmux::app::modem_status::Registration;
use trackmux::app::ports::TransportError;
use trackmux::command::engine::{CommandRequest, CommandState};
use trackmux::command::send_with_retries;
use trackmux::config::PipelineConfig;
use trackmux::error::CommandError;
use trackmux::stream::frame::Category;
use trackmux::{CaptureStep, Pipeline};

use crate::mock_link::{mock_modem, SilentTx};

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        capture_read_timeout_ms: 5,
        harvest_poll_ms: 5,
        dequeue_timeout_ms: 10,
        command_settle_ms: 10,
        ..PipelineConfig::default()
    }
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

type Sent = Arc<Mutex<Vec<Vec<u8>>>>;

fn collector(sent: &Sent) -> impl FnMut(&[u8]) -> Result<(), TransportError> + Send + 'static {
    let sent = Arc::clone(sent);
    move |p: &[u8]| -> Result<(), TransportError> {
        sent.lock().unwrap().push(p.to_vec());
        Ok(())
    }
}

// ── Silent modem ──────────────────────────────────────────────

#[test]
fn silent_modem_times_out_without_leaking_frames() {
    let mut pipeline = Pipeline::init(fast_config(), SilentTx).unwrap();
    pipeline.register_defaults();
    let stats = pipeline.stats();
    let mut engine = pipeline.command_engine();
    let mut loops = pipeline.into_loops(|_: &[u8]| -> Result<(), TransportError> { Ok(()) });

    let req = CommandRequest::new("AT")
        .expect("OK")
        .timeout(Duration::from_millis(50));
    let started = Instant::now();
    assert_eq!(engine.execute(&req).unwrap_err(), CommandError::TimedOut);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(engine.state(), CommandState::TimedOut);

    assert_eq!(loops.capture.step(), CaptureStep::Idle);
    let snap = stats.snapshot();
    assert_eq!(snap.router.routed, 0);
    assert_eq!(snap.pool.in_use, 0);
    assert_eq!(snap.command.timeouts, 1);
    assert_eq!(snap.command.sent, 1);
}

#[test]
fn invalid_command_text_is_rejected_before_the_link() {
    let pipeline = Pipeline::init(fast_config(), SilentTx).unwrap();
    let stats = pipeline.stats();
    let mut engine = pipeline.command_engine();
    assert_eq!(
        engine.execute(&CommandRequest::new("AT\r\nAT")).unwrap_err(),
        CommandError::Invalid
    );
    assert_eq!(engine.execute(&CommandRequest::new("")).unwrap_err(), CommandError::Invalid);
    assert_eq!(stats.snapshot().command.sent, 0);
}

// ── Live pipeline ─────────────────────────────────────────────

#[test]
fn positioning_inside_response_is_delayed_not_lost() {
    let (modem, modem_rx, handle) = mock_modem();
    handle.script("AT+CSQ", b"\r\n$GPGGA,1*00\r\n+CSQ: 20,99\r\n\r\nOK\r\n");

    let mut pipeline = Pipeline::init(fast_config(), modem).unwrap();
    let tracker = pipeline.register_defaults();
    let mut engine = pipeline.command_engine();
    let sent: Sent = Arc::default();
    let running = pipeline.start(modem_rx, collector(&sent)).unwrap();

    let resp = engine
        .execute(&CommandRequest::new("AT+CSQ").timeout(Duration::from_secs(1)))
        .unwrap();
    assert_eq!(resp.line_starting_with("+CSQ:"), Some("+CSQ: 20,99"));
    assert!(!resp.text.contains("$GPGGA"));
    assert!(!resp.truncated);
    assert_eq!(tracker.apply_response(&resp.text), 1);
    assert_eq!(tracker.status().rssi_dbm, Some(-73));

    wait_for("deferred sentence", || {
        sent.lock().unwrap().iter().any(|p| p == b"$GPGGA,1*00\n")
    });

    let snap = running.shutdown().unwrap();
    assert_eq!(snap.command.matched, 1);
    assert_eq!(snap.router.count(Category::Positioning), 1);
    assert_eq!(handle.commands(), vec!["AT+CSQ".to_owned()]);
}

#[test]
fn unsolicited_status_reaches_tracker_while_streaming() {
    let (modem, modem_rx, handle) = mock_modem();
    let mut pipeline = Pipeline::init(fast_config(), modem).unwrap();
    let tracker = pipeline.register_defaults();
    let sent: Sent = Arc::default();
    let running = pipeline.start(modem_rx, collector(&sent)).unwrap();

    handle.emit(b"$GNGGA,1\r\n+CREG: 5\r\n$GNGGA,");
    handle.emit(b"2\r\n");

    wait_for("two sentences", || sent.lock().unwrap().len() == 2);
    wait_for("registration", || tracker.status().registration == Registration::Roaming);
    assert_eq!(
        *sent.lock().unwrap(),
        vec![b"$GNGGA,1\n".to_vec(), b"$GNGGA,2\n".to_vec()]
    );
    running.shutdown().unwrap();
}

#[test]
fn retries_stop_after_the_configured_attempts() {
    let (modem, modem_rx, handle) = mock_modem();
    handle.script("AT+CGNSSPWR=1", b"\r\n+CME ERROR: 3\r\n");

    let pipeline = Pipeline::init(fast_config(), modem).unwrap();
    let stats = pipeline.stats();
    let mut engine = pipeline.command_engine();
    let running = pipeline.start(modem_rx, |_: &[u8]| -> Result<(), TransportError> { Ok(()) }).unwrap();

    let req = CommandRequest::new("AT+CGNSSPWR=1")
        .timeout(Duration::from_millis(200))
        .retries(2);
    assert_eq!(send_with_retries(&mut engine, &req).unwrap_err(), CommandError::ErrorSeen);
    assert_eq!(handle.commands().len(), 3);
    assert_eq!(stats.snapshot().command.errors_seen, 3);

    running.shutdown().unwrap();
}

#[test]
fn retry_succeeds_once_the_modem_answers() {
    let (modem, modem_rx, handle) = mock_modem();
    let pipeline = Pipeline::init(fast_config(), modem).unwrap();
    let mut engine = pipeline.command_engine();
    let running = pipeline.start(modem_rx, |_: &[u8]| -> Result<(), TransportError> { Ok(()) }).unwrap();

    // First attempt goes unanswered; the script is installed before the second.
    let script = handle.clone();
    let installer = thread::spawn(move || {
        wait_for("first attempt", || !script.commands().is_empty());
        script.script("AT", b"OK\r\n");
    });

    let req = CommandRequest::new("AT")
        .timeout(Duration::from_millis(150))
        .retries(3);
    let resp = send_with_retries(&mut engine, &req).unwrap();
    installer.join().unwrap();
    assert!(resp.text.contains("OK"));
    assert!(handle.commands().len() >= 2);

    running.shutdown().unwrap();
}

#[test]
fn fire_and_forget_returns_after_settle() {
    let (modem, modem_rx, handle) = mock_modem();
    let pipeline = Pipeline::init(fast_config(), modem).unwrap();
    let mut engine = pipeline.command_engine();
    let running = pipeline.start(modem_rx, |_: &[u8]| -> Result<(), TransportError> { Ok(()) }).unwrap();

    let resp = engine
        .execute(&CommandRequest::new("AT+CGNSSTST=1").no_reply())
        .unwrap();
    assert!(resp.text.is_empty());
    assert!(resp.elapsed >= Duration::from_millis(10));
    assert_eq!(engine.state(), CommandState::Matched);
    assert_eq!(handle.commands(), vec!["AT+CGNSSTST=1".to_owned()]);

    running.shutdown().unwrap();
}
