//! Pipeline context: owns every shared resource and starts the loops.
//!
//! ```text
//!   UART ─▶ Harvester ─▶ ring ─▶ CaptureLoop ─▶ Router ─┬─▶ positioning ─▶ queue ─▶ TransmissionWorker ─▶ network
//!                          ▲       (App core)           ├─▶ modem status
//!                          │                            └─▶ ...
//!                    CommandEngine (holds the link token for a window)
//! ```
//!
//! Everything is allocated once in [`Pipeline::init`]; failure there is
//! fatal and reported to the caller.  After [`Pipeline::start`] the hot
//! paths never allocate.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use crate::app::handlers::{control_ack_logger, positioning_forwarder, ForwarderStats};
use crate::app::modem_status::ModemStatusTracker;
use crate::app::ports::{LinkRx, LinkTx, NetworkTransport, StatsSink};
use crate::capture::assembler::FrameAssembler;
use crate::capture::harvester::Harvester;
use crate::capture::pool::FramePool;
use crate::capture::ring::{byte_ring, RingProducer};
use crate::command::engine::{CommandEngine, CommandStats};
use crate::command::link::SharedLink;
use crate::config::PipelineConfig;
use crate::drivers::task_pin::{spawn_on_core, CAPTURE_TASK, HARVEST_TASK, TRANSMIT_TASK};
use crate::error::{Error, Result};
use crate::stats::{Counter, StatsHandles, StatsSnapshot};
use crate::stream::frame::Category;
use crate::stream::router::{Handler, Router};
use crate::transport::queue::{transport_queue, TransportReceiver, TransportSender};
use crate::transport::worker::{TransmissionWorker, WorkerStats, WorkerTiming};

/// Pause after yielding the link to a command window.
const YIELD_BACKOFF: Duration = Duration::from_millis(1);

// ── Capture loop ──────────────────────────────────────────────

/// What one capture iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    /// A command window holds the link.
    Yielded,
    /// No bytes within the read timeout.
    Idle,
    /// Bytes were consumed; this many complete frames were routed.
    Frames(usize),
}

/// Ring → assembler → router, on the application core.
pub struct CaptureLoop {
    link: SharedLink,
    assembler: FrameAssembler,
    router: Router,
    read_timeout: Duration,
    last_window: u32,
    scratch: Vec<u8>,
    yields: Arc<Counter>,
}

impl CaptureLoop {
    /// One iteration.  Never blocks longer than the read timeout and never
    /// waits for the link token.
    pub fn step(&mut self) -> CaptureStep {
        let n = {
            let Some(mut port) = self.link.try_acquire() else {
                self.yields.incr();
                return CaptureStep::Yielded;
            };
            let window = port.window_count();
            if window != self.last_window {
                // The engine consumed bytes this assembler never saw.
                self.last_window = window;
                self.assembler.resync();
            }
            port.read(&mut self.scratch, self.read_timeout)
        };
        if n == 0 {
            return CaptureStep::Idle;
        }

        let mut frames = 0;
        let router = &mut self.router;
        self.assembler.feed(&self.scratch[..n], |raw| {
            router.dispatch(raw);
            frames += 1;
        });
        CaptureStep::Frames(frames)
    }

    /// Run until `stop` is raised.
    pub fn run(mut self, stop: &AtomicBool) {
        info!("Capture loop running");
        while !stop.load(Ordering::Acquire) {
            if self.step() == CaptureStep::Yielded {
                thread::sleep(YIELD_BACKOFF);
            }
        }
        info!("Capture loop stopped");
    }
}

// ── Pipeline ──────────────────────────────────────────────────

/// The three loops, unstarted.  Tests drive them step by step.
pub struct Loops<N> {
    pub harvester: Harvester,
    pub capture: CaptureLoop,
    pub worker: TransmissionWorker<N>,
}

pub struct Pipeline {
    config: PipelineConfig,
    producer: RingProducer,
    link: SharedLink,
    assembler: FrameAssembler,
    router: Router,
    tx: TransportSender,
    rx: TransportReceiver,
    stats: StatsHandles,
    forwarder: Arc<ForwarderStats>,
    sink: Option<Box<dyn StatsSink + Send>>,
}

impl Pipeline {
    /// Validate `config` and allocate the ring, pool, queue and link token.
    pub fn init(config: PipelineConfig, link_tx: impl LinkTx + 'static) -> Result<Self> {
        config.validate()?;

        let (producer, consumer) = byte_ring(config.ring_capacity as usize)?;
        let ring = producer.monitor();
        let pool = FramePool::new(usize::from(config.pool_slots), usize::from(config.frame_capacity))?;
        let (tx, rx) = transport_queue(usize::from(config.queue_depth))?;
        let link = SharedLink::new(consumer, link_tx, ring.clone(), config.deferred_capacity as usize)?;

        let assembler = FrameAssembler::new(pool.clone());
        let router = Router::new();
        let stats = StatsHandles {
            ring,
            pool,
            assembler: assembler.stats(),
            router: router.stats(),
            queue: tx.stats(),
            worker: Arc::new(WorkerStats::default()),
            command: Arc::new(CommandStats::default()),
            capture_yields: Arc::new(Counter::new()),
        };

        info!(
            "Pipeline ready | ring={}B pool={}x{}B queue={} policy={:?}",
            config.ring_capacity, config.pool_slots, config.frame_capacity, config.queue_depth, config.enqueue_policy
        );

        Ok(Self {
            config,
            producer,
            link,
            assembler,
            router,
            tx,
            rx,
            stats,
            forwarder: Arc::new(ForwarderStats::default()),
            sink: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Install `handler` for `category`, returning the one it replaces.
    pub fn register(&mut self, category: Category, handler: Handler) -> Option<Handler> {
        self.router.register(category, handler)
    }

    /// Positioning → transport queue, modem status → tracker, control
    /// acknowledgements → debug log.  Returns the tracker.
    pub fn register_defaults(&mut self) -> ModemStatusTracker {
        let forwarder = positioning_forwarder(
            self.tx.clone(),
            self.config.enqueue_policy,
            self.config.verify_nmea_checksum,
            Arc::clone(&self.forwarder),
        );
        self.router.register(Category::Positioning, forwarder);

        let tracker = ModemStatusTracker::new();
        self.router.register(Category::ModemStatusLine, tracker.handler());
        self.router.register(Category::ControlAck, control_ack_logger());
        tracker
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.router.set_trace(enabled);
    }

    /// Periodic snapshot destination for the transmission worker.
    pub fn set_stats_sink(&mut self, sink: Box<dyn StatsSink + Send>) {
        self.sink = Some(sink);
    }

    pub fn transport_sender(&self) -> TransportSender {
        self.tx.clone()
    }

    /// A command engine sharing the link token and command counters.
    pub fn command_engine(&self) -> CommandEngine {
        CommandEngine::new(self.link.clone(), self.config.command_settle())
            .with_stats(Arc::clone(&self.stats.command))
    }

    pub fn stats(&self) -> StatsHandles {
        self.stats.clone()
    }

    pub fn forwarder_stats(&self) -> Arc<ForwarderStats> {
        Arc::clone(&self.forwarder)
    }

    /// Build the loops without starting any thread.
    pub fn into_loops<N: NetworkTransport>(self, network: N) -> Loops<N> {
        let Self {
            config,
            producer,
            link,
            assembler,
            router,
            tx,
            rx,
            stats,
            sink,
            ..
        } = self;
        // Only handlers keep senders; the worker sees `Closed` once capture is gone.
        drop(tx);

        let mut worker = TransmissionWorker::new(rx, network, WorkerTiming::from(&config))
            .with_stats(Arc::clone(&stats.worker));
        if let Some(sink) = sink {
            worker = worker.with_reporter(sink, stats.clone());
        }

        Loops {
            harvester: Harvester::new(producer),
            capture: CaptureLoop {
                link,
                assembler,
                router,
                read_timeout: config.capture_read_timeout(),
                last_window: 0,
                scratch: vec![0; usize::from(config.frame_capacity)],
                yields: Arc::clone(&stats.capture_yields),
            },
            worker,
        }
    }

    /// Spawn the harvester and capture loop on the application core and
    /// the transmission worker on the protocol core.
    pub fn start<R, N>(self, link_rx: R, network: N) -> Result<RunningPipeline>
    where
        R: LinkRx + 'static,
        N: NetworkTransport + Send + 'static,
    {
        let harvest_poll = self.config.harvest_poll();
        let stats = self.stats.clone();
        let Loops {
            harvester,
            capture,
            worker,
        } = self.into_loops(network);

        let stop = Arc::new(AtomicBool::new(false));
        let mut running = RunningPipeline {
            stop: Arc::clone(&stop),
            handles: Vec::with_capacity(3),
            stats,
        };

        let flag = Arc::clone(&stop);
        running.spawn(TRANSMIT_TASK.name, spawn_on_core(TRANSMIT_TASK, move || worker.run(&flag)))?;
        let flag = Arc::clone(&stop);
        running.spawn(CAPTURE_TASK.name, spawn_on_core(CAPTURE_TASK, move || capture.run(&flag)))?;
        let flag = Arc::clone(&stop);
        running.spawn(
            HARVEST_TASK.name,
            spawn_on_core(HARVEST_TASK, move || harvester.run(link_rx, harvest_poll, &flag)),
        )?;

        Ok(running)
    }
}

// ── Running pipeline ──────────────────────────────────────────

pub struct RunningPipeline {
    stop: Arc<AtomicBool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    stats: StatsHandles,
}

impl RunningPipeline {
    /// Record a spawned loop, or stop the ones already running if the
    /// spawn failed.
    fn spawn(&mut self, name: &'static str, spawned: Result<JoinHandle<()>>) -> Result<()> {
        match spawned {
            Ok(handle) => {
                self.handles.push((name.trim_end_matches('\0'), handle));
                Ok(())
            }
            Err(e) => {
                self.stop.store(true, Ordering::Release);
                self.join_all();
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats(&self) -> &StatsHandles {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Acquire)
    }

    /// Raise the stop flag and join every loop.
    pub fn shutdown(mut self) -> Result<StatsSnapshot> {
        self.stop.store(true, Ordering::Release);
        if self.join_all() {
            Ok(self.stats.snapshot())
        } else {
            Err(Error::Task("pipeline task panicked"))
        }
    }

    fn join_all(&mut self) -> bool {
        let mut clean = true;
        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Task '{}' panicked", name);
                clean = false;
            }
        }
        clean
    }
}
