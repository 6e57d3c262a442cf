//! Capture pipeline: source → ring → decoder → sink.
//!
//! ```text
//! Idle --start()--> Running --stop()/source end--> Draining --ring empty--> Stopped
//! ```
//!
//! A producer thread reads the capture source and pushes into the ring. A consumer thread
//! pops, decodes and hands each frame to the sink. Shutdown is a drain: the producer stops
//! reading and closes the ring, and the consumer delivers everything still buffered before
//! the pipeline reports [`PipelineState::Stopped`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};

use crate::config::CaptureConfig;
use crate::decode::decode;
use crate::error::PipelineError;
use crate::record::CapturedRecord;
use crate::ring::RingBuffer;
use crate::sink::Sink;
use crate::source::{CaptureSource, NextRecord, SourceOpener};
use crate::stats::{CaptureStats, DeviceStats, StatsCounters};

/// Records read between two device counter refreshes on a busy link.
const STATS_REFRESH_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct Shared {
    state: Mutex<PipelineState>,
    state_changed: Condvar,
    stop_requested: AtomicBool,
    counters: StatsCounters,
    ring: OnceLock<Arc<RingBuffer<CapturedRecord>>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: &mut PipelineState, next: PipelineState) {
        if *state != next {
            debug!("Pipeline {} -> {}", state, next);
            *state = next;
            self.state_changed.notify_all();
        }
    }

    /// Running -> Draining; any other state is left alone.
    fn begin_drain(&self, reason: &str) {
        let mut state = self.lock_state();
        if *state == PipelineState::Running {
            info!("Draining capture pipeline: {}", reason);
            self.set_state(&mut state, PipelineState::Draining);
        }
    }

    fn snapshot(&self) -> CaptureStats {
        self.counters
            .snapshot(|| self.ring.get().map_or(0, |ring| ring.dropped()))
    }
}

/// Owns the capture workers for one interface. Not restartable once stopped.
pub struct Pipeline {
    shared: Arc<Shared>,
    opener: Box<dyn SourceOpener>,
    sink: Mutex<Option<Box<dyn Sink>>>,
    workers: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Pipeline {
    pub fn new<O, S>(opener: O, sink: S) -> Self
    where
        O: SourceOpener + 'static,
        S: Sink + 'static,
    {
        Pipeline {
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState::Idle),
                state_changed: Condvar::new(),
                stop_requested: AtomicBool::new(false),
                counters: StatsCounters::default(),
                ring: OnceLock::new(),
            }),
            opener: Box::new(opener),
            sink: Mutex::new(Some(Box::new(sink))),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.lock_state()
    }

    /// Opens the source and spawns the producer and consumer threads.
    ///
    /// A device error leaves the pipeline `Idle`.
    pub fn start(&self, interface: &str, config: &CaptureConfig) -> Result<(), PipelineError> {
        config.validate()?;
        let mut state = self.shared.lock_state();
        if *state != PipelineState::Idle {
            return Err(PipelineError::InvalidState(*state));
        }

        let source = self.opener.open(interface, config)?;
        let Some(sink) = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(PipelineError::InvalidState(*state));
        };
        let ring = Arc::clone(
            self.shared
                .ring
                .get_or_init(|| Arc::new(RingBuffer::with_capacity(config.ring_capacity))),
        );

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);

        let consumer = {
            let shared = Arc::clone(&self.shared);
            let ring = Arc::clone(&ring);
            thread::Builder::new()
                .name(format!("decode-{}", interface))
                .spawn(move || run_consumer(&shared, &ring, sink))
        };
        let consumer = match consumer {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.set_state(&mut state, PipelineState::Stopped);
                return Err(PipelineError::Spawn {
                    name: "consumer",
                    source: e,
                });
            }
        };
        workers.push(("consumer", consumer));

        let producer = {
            let shared = Arc::clone(&self.shared);
            let ring = Arc::clone(&ring);
            thread::Builder::new()
                .name(format!("capture-{}", interface))
                .spawn(move || run_producer(&shared, &ring, source))
        };
        match producer {
            Ok(handle) => workers.push(("producer", handle)),
            Err(e) => {
                // the consumer finds a closed, empty ring and marks the pipeline stopped
                ring.close();
                self.shared.set_state(&mut state, PipelineState::Draining);
                return Err(PipelineError::Spawn {
                    name: "producer",
                    source: e,
                });
            }
        }

        info!(
            "Pipeline started on {} with a {} slot ring",
            interface, config.ring_capacity
        );
        self.shared.set_state(&mut state, PipelineState::Running);
        Ok(())
    }

    /// Asks the workers to finish. Safe to call from any state and any number of times.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        let mut state = self.shared.lock_state();
        match *state {
            PipelineState::Idle => self.shared.set_state(&mut state, PipelineState::Stopped),
            PipelineState::Running => {
                info!("Stop requested, draining buffered frames");
                self.shared.set_state(&mut state, PipelineState::Draining);
            }
            PipelineState::Draining | PipelineState::Stopped => {}
        }
    }

    /// Blocks until the pipeline is stopped, joins the workers and returns the final stats.
    pub fn wait(&self) -> Result<CaptureStats, PipelineError> {
        {
            let state = self.shared.lock_state();
            if *state == PipelineState::Idle {
                return Err(PipelineError::InvalidState(*state));
            }
            let _stopped = self
                .shared
                .state_changed
                .wait_while(state, |s| *s != PipelineState::Stopped)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.join_workers()?;
        Ok(self.stats())
    }

    /// Waits up to `timeout` for the pipeline to stop. Returns whether it did.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock_state();
        while *state != PipelineState::Stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .state_changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub fn stats(&self) -> CaptureStats {
        self.shared.snapshot()
    }

    /// Latest counters reported by the device itself.
    pub fn device_stats(&self) -> DeviceStats {
        self.shared.counters.device()
    }

    fn join_workers(&self) -> Result<(), PipelineError> {
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let mut result = Ok(());
        for (name, handle) in workers {
            if handle.join().is_err() {
                error!("{} thread panicked", name);
                result = Err(PipelineError::WorkerPanicked(name));
            }
        }
        result
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.join_workers() {
            warn!("Pipeline dropped with failed worker: {}", e);
        }
    }
}

/// Closes the ring when the producer exits, even by panic, so the consumer can finish.
struct CloseOnExit<'a>(&'a RingBuffer<CapturedRecord>);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Marks the pipeline stopped when the consumer exits.
struct StoppedOnExit<'a>(&'a Shared);

impl Drop for StoppedOnExit<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock_state();
        self.0.set_state(&mut state, PipelineState::Stopped);
    }
}

fn refresh_device_stats(shared: &Shared, source: &mut dyn CaptureSource) {
    if let Some(stats) = source.device_stats() {
        shared.counters.record_device(stats);
    }
}

fn run_producer(
    shared: &Shared,
    ring: &RingBuffer<CapturedRecord>,
    mut source: Box<dyn CaptureSource>,
) {
    let _close = CloseOnExit(ring);
    let mut since_refresh = 0u64;

    let reason = loop {
        if shared.stop_requested.load(Ordering::SeqCst) {
            break "stop requested";
        }
        match source.next_record() {
            Ok(NextRecord::Record(record)) => {
                if record.truncated {
                    trace!(
                        "Truncated capture: {} of {} bytes",
                        record.captured_length(),
                        record.original_length
                    );
                }
                shared.counters.record_received();
                ring.push(record);
                since_refresh += 1;
                if since_refresh >= STATS_REFRESH_INTERVAL {
                    refresh_device_stats(shared, source.as_mut());
                    since_refresh = 0;
                }
            }
            Ok(NextRecord::Idle) => refresh_device_stats(shared, source.as_mut()),
            Ok(NextRecord::EndOfCapture) => break "capture source exhausted",
            Err(e) => {
                error!("Capture stopped: {}", e);
                break "capture read failed";
            }
        }
    };

    refresh_device_stats(shared, source.as_mut());
    source.close();
    shared.begin_drain(reason);
    debug!("Producer exiting: {}", reason);
}

fn run_consumer(shared: &Shared, ring: &RingBuffer<CapturedRecord>, mut sink: Box<dyn Sink>) {
    let _stopped = StoppedOnExit(shared);

    while let Some(record) = ring.pop_wait() {
        let frame = decode(&record.data);
        shared.counters.record_frame(frame.is_complete());
        if let Some(e) = &frame.error {
            debug!("Incomplete frame ({} bytes): {}", record.captured_length(), e);
        }

        let delivery = panic::catch_unwind(AssertUnwindSafe(|| {
            sink.accept(record.capture_timestamp, &frame)
        }));
        match delivery {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                shared.counters.record_sink_error();
                warn!("Sink rejected frame: {:#}", e);
            }
            Err(_) => {
                shared.counters.record_sink_error();
                error!("Sink panicked while handling a frame");
            }
        }
    }

    if panic::catch_unwind(AssertUnwindSafe(|| sink.finish())).is_err() {
        error!("Sink panicked while finishing");
    }
    let stats = shared.snapshot();
    info!(
        "Pipeline drained: {} received, {} delivered, {} dropped by ring, {} decode errors",
        stats.received,
        stats.delivered(),
        stats.dropped_by_ring,
        stats.decode_errors
    );
}
