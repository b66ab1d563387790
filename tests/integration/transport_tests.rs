//! Transport queue backpressure and the transmission worker.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use trackmux::app::ports::{StatsSink, TransportError};
use trackmux::config::{EnqueuePolicy, PipelineConfig};
use trackmux::error::Fault;
use trackmux::stats::StatsSnapshot;
use trackmux::diagnostics::HealthMonitor;
use trackmux::transport::worker::StepOutcome;
use trackmux::{CaptureStep, Pipeline};

use crate::mock_link::SilentTx;

struct RecordingSink(Arc<Mutex<Vec<StatsSnapshot>>>);

impl StatsSink for RecordingSink {
    fn emit(&mut self, snapshot: &StatsSnapshot) {
        self.0.lock().unwrap().push(*snapshot);
    }
}

fn config(queue_depth: u16, policy: EnqueuePolicy) -> PipelineConfig {
    PipelineConfig {
        queue_depth,
        enqueue_policy: policy,
        dequeue_timeout_ms: 5,
        ..PipelineConfig::default()
    }
}

#[test]
fn full_queue_drops_newest_and_keeps_order() {
    let mut pipeline = Pipeline::init(config(2, EnqueuePolicy::DropNewest), SilentTx).unwrap();
    pipeline.register_defaults();
    let stats = pipeline.stats();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sent);
    let mut loops = pipeline.into_loops(move |p: &[u8]| -> Result<(), TransportError> {
        sink.lock().unwrap().push(p.to_vec());
        Ok(())
    });

    loops.harvester.on_receive(b"$GPGGA,1\r\n$GPGGA,2\r\n$GPGGA,3\r\n");
    assert_eq!(loops.capture.step(), CaptureStep::Frames(3));

    let snap = stats.snapshot();
    assert_eq!(snap.transport.enqueued, 2);
    assert_eq!(snap.transport.transport_drops, 1);
    assert_eq!(snap.fault_count(Fault::TransportTimeout), 1);
    // Dropped frame went straight back to the pool.
    assert_eq!(snap.pool.in_use, 2);

    assert!(matches!(loops.worker.step(), StepOutcome::Sent(_)));
    assert!(matches!(loops.worker.step(), StepOutcome::Sent(_)));
    assert_eq!(loops.worker.step(), StepOutcome::Idle);
    assert_eq!(
        *sent.lock().unwrap(),
        vec![b"$GPGGA,1\n".to_vec(), b"$GPGGA,2\n".to_vec()]
    );
    assert_eq!(stats.snapshot().pool.in_use, 0);
}

#[test]
fn blocking_policy_waits_at_most_its_timeout() {
    let mut pipeline =
        Pipeline::init(config(1, EnqueuePolicy::Block { timeout_ms: 30 }), SilentTx).unwrap();
    pipeline.register_defaults();
    let stats = pipeline.stats();
    let mut loops = pipeline.into_loops(|_: &[u8]| -> Result<(), TransportError> { Ok(()) });

    loops.harvester.on_receive(b"$GPGGA,1\r\n$GPGGA,2\r\n");
    let started = Instant::now();
    assert_eq!(loops.capture.step(), CaptureStep::Frames(2));
    let waited = started.elapsed();

    assert!(waited >= Duration::from_millis(30));
    assert!(waited < Duration::from_secs(1));
    assert_eq!(stats.snapshot().transport.transport_drops, 1);
}

#[test]
fn failed_transmissions_are_counted_and_flag_health() {
    let mut pipeline = Pipeline::init(config(4, EnqueuePolicy::DropNewest), SilentTx).unwrap();
    pipeline.register_defaults();
    let stats = pipeline.stats();
    let mut health = HealthMonitor::new(stats.snapshot());
    let mut loops = pipeline.into_loops(|_: &[u8]| -> Result<(), TransportError> {
        Err(TransportError::Timeout)
    });

    loops.harvester.on_receive(b"$GPGGA,1\r\n");
    loops.capture.step();
    assert_eq!(loops.worker.step(), StepOutcome::Failed);

    let snap = stats.snapshot();
    assert_eq!(snap.worker.transmission_errors, 1);
    assert_eq!(snap.worker.frames_sent, 0);
    assert_eq!(snap.pool.in_use, 0);

    let verdict = health.evaluate(snap);
    assert!(verdict.is_degraded());
    assert!(!health.evaluate(stats.snapshot()).is_degraded());
}

#[test]
fn worker_reports_snapshots_to_sink() {
    let mut config = config(4, EnqueuePolicy::DropNewest);
    config.report_interval_secs = 0;
    let mut pipeline = Pipeline::init(config, SilentTx).unwrap();
    let reports = Arc::new(Mutex::new(Vec::new()));
    pipeline.set_stats_sink(Box::new(RecordingSink(Arc::clone(&reports))));
    let mut loops = pipeline.into_loops(|_: &[u8]| -> Result<(), TransportError> { Ok(()) });

    assert_eq!(loops.worker.step(), StepOutcome::Idle);
    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].pool.slots, 4);
}

#[test]
fn worker_sees_closed_queue_after_capture_is_gone() {
    let mut pipeline = Pipeline::init(config(4, EnqueuePolicy::DropNewest), SilentTx).unwrap();
    pipeline.register_defaults();
    let loops = pipeline.into_loops(|_: &[u8]| -> Result<(), TransportError> { Ok(()) });
    let mut worker = loops.worker;
    drop(loops.capture);
    assert_eq!(worker.step(), StepOutcome::Closed);
}
