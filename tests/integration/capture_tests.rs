//! Capture path: ring → assembler → router → handlers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use trackmux::app::ports::TransportError;
use trackmux::capture::assembler::FrameAssembler;
use trackmux::capture::pool::FramePool;
use trackmux::capture::ring::byte_ring;
use trackmux::config::{EnqueuePolicy, PipelineConfig};
use trackmux::stream::frame::{Category, Frame};
use trackmux::stream::router::Router;
use trackmux::transport::worker::StepOutcome;
use trackmux::{CaptureStep, Pipeline};

use crate::mock_link::SilentTx;

const RMC: &[u8] = b"$GNRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A\r\n";

fn recording_router(seen: &Arc<Mutex<Vec<(Category, String)>>>) -> Router {
    let mut router = Router::new();
    for cat in Category::ALL {
        let seen = Arc::clone(seen);
        router.register(
            cat,
            Box::new(move |f: Frame| {
                seen.lock()
                    .unwrap()
                    .push((f.category(), f.as_str().unwrap_or_default().to_owned()));
            }),
        );
    }
    router
}

// ── Positioning line end to end ───────────────────────────────

#[test]
fn positioning_line_reaches_transport_queue_once() {
    let config = PipelineConfig {
        enqueue_policy: EnqueuePolicy::DropNewest,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::init(config, SilentTx).unwrap();
    pipeline.register_defaults();
    let stats = pipeline.stats();
    let forwarder = pipeline.forwarder_stats();

    let sent = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sent);
    let mut loops = pipeline.into_loops(move |p: &[u8]| -> Result<(), TransportError> {
        sink.lock().unwrap().push(p.to_vec());
        Ok(())
    });

    assert_eq!(loops.harvester.on_receive(RMC), RMC.len());
    assert_eq!(loops.capture.step(), CaptureStep::Frames(1));

    let snap = stats.snapshot();
    assert_eq!(snap.router.count(Category::Positioning), 1);
    assert_eq!(forwarder.forwarded(), 1);
    assert_eq!(snap.transport.enqueued, 1);
    assert_eq!(snap.transport.depth, 1);

    assert_eq!(loops.worker.step(), StepOutcome::Sent(RMC.len() - 1));
    let mut expected = RMC[..RMC.len() - 2].to_vec();
    expected.push(b'\n');
    assert_eq!(*sent.lock().unwrap(), vec![expected]);
    assert_eq!(stats.snapshot().pool.in_use, 0);
}

// ── Mixed chunk keeps arrival order ───────────────────────────

#[test]
fn status_then_ack_in_one_chunk_routes_in_order() {
    let pool = FramePool::new(4, 128).unwrap();
    let mut asm = FrameAssembler::new(pool.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut router = recording_router(&seen);

    asm.feed(b"+CREG: 0,1\r\nOK\r\n", |raw| {
        router.dispatch(raw);
    });

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (Category::ModemStatusLine, "+CREG: 0,1".to_owned()),
            (Category::ControlAck, "OK".to_owned()),
        ]
    );
    assert_eq!(pool.in_use(), 0);
}

// ── Pool exhaustion ───────────────────────────────────────────

#[test]
fn exhausted_pool_emits_nothing_and_counts_once() {
    let pool = FramePool::new(3, 128).unwrap();
    let held: Vec<_> = (0..3).map(|_| pool.checkout().unwrap()).collect();
    let before = pool.exhausted_count();

    let mut asm = FrameAssembler::new(pool.clone());
    let mut emitted = 0;
    asm.feed(b"$GPGGA,123519,4807.038,N\r\n", |_| emitted += 1);

    assert_eq!(emitted, 0);
    assert_eq!(pool.exhausted_count(), before + 1);
    assert!(asm.stats().overrun_bytes() > 0);

    // Capture recovers as soon as a slot is free again.
    drop(held);
    asm.feed(b"$GPGGA,2\r\n", |raw| {
        assert_eq!(&raw.buf[..], b"$GPGGA,2");
        emitted += 1;
    });
    assert_eq!(emitted, 1);
}

// ── Chunking and noise ────────────────────────────────────────

#[test]
fn byte_at_a_time_delivery_matches_bulk_delivery() {
    let (mut tx, mut rx) = byte_ring(256).unwrap();
    let pool = FramePool::new(4, 128).unwrap();
    let mut asm = FrameAssembler::new(pool);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut router = recording_router(&seen);

    let stream = b"\r\n$GPGSV,3,1,11\r\n+CSQ: 20,99\r\n\r\n+CMQTTCONNECT: 0,0\r\nERROR\r\ngarbage\r\n";
    for b in stream {
        assert_eq!(tx.push(std::slice::from_ref(b)), 1);
        let mut one = [0u8; 1];
        let n = rx.pop(&mut one, Duration::from_millis(1));
        asm.feed(&one[..n], |raw| {
            router.dispatch(raw);
        });
    }

    let cats: Vec<Category> = seen.lock().unwrap().iter().map(|(c, _)| *c).collect();
    assert_eq!(
        cats,
        vec![
            Category::Positioning,
            Category::ModemStatusLine,
            Category::DataServiceResponse,
            Category::ControlAck,
            Category::Unclassified,
        ]
    );
}

#[test]
fn ring_overflow_is_counted_and_capture_continues() {
    let (mut tx, mut rx) = byte_ring(16).unwrap();
    let monitor = tx.monitor();
    assert_eq!(tx.push(b"$GPGGA,0123456789ABCDEF\r\n"), 16);
    assert_eq!(monitor.overflow_count(), 1);

    let mut buf = [0u8; 32];
    let n = rx.try_pop(&mut buf);
    assert_eq!(n, 16);
    assert_eq!(tx.push(b"OK\r\n"), 4);
}

#[test]
fn idle_capture_step_is_bounded_by_read_timeout() {
    let config = PipelineConfig {
        capture_read_timeout_ms: 5,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::init(config, SilentTx).unwrap();
    let mut loops = pipeline.into_loops(|_: &[u8]| -> Result<(), TransportError> { Ok(()) });

    let started = Instant::now();
    assert_eq!(loops.capture.step(), CaptureStep::Idle);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn unregistered_category_is_counted_unhandled() {
    let mut pipeline = Pipeline::init(PipelineConfig::default(), SilentTx).unwrap();
    pipeline.register_defaults();
    let stats = pipeline.stats();
    let mut loops = pipeline.into_loops(|_: &[u8]| -> Result<(), TransportError> { Ok(()) });

    loops.harvester.on_receive(b"+CMQTTRXSTART: 0,12\r\nnoise\r\n");
    assert_eq!(loops.capture.step(), CaptureStep::Frames(2));

    let snap = stats.snapshot();
    assert_eq!(snap.router.routed, 2);
    assert_eq!(snap.router.unhandled, 2);
    assert_eq!(snap.pool.in_use, 0);
}
