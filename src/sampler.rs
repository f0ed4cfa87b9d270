//! Streaming sampler: periodic measurement over a live frame source.
//!
//! Three activities run concurrently while the sampler is `Running`:
//! - the frame source, writing into a single latest-frame slot;
//! - the ticker thread, which on each tick hands the latest frame to the
//!   worker unless a run is already in flight (busy ticks are skipped, never
//!   queued);
//! - the inference worker, which owns the pipeline and delivers each result
//!   to the presentation sink.
//!
//! Delivery and `stop()` share one lock, so once `stop()` has returned the sink
//! is never called again. A run that is still in flight at that point finishes
//! and its result is dropped.

use anyhow::{anyhow, bail, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::{Frame, FrameSlot};
use crate::ingest::FrameSource;
use crate::pipeline::TwoStagePipeline;
use crate::{Estimates, MeasurementResult};

// ----------------------------------------------------------------------------
// Presentation sink
// ----------------------------------------------------------------------------

/// Receives results on the inference worker thread.
pub trait PresentationSink: Send {
    fn on_result(&mut self, result: MeasurementResult);

    /// Diagnostic text for a run that degraded. Called before `on_result`.
    fn on_status(&mut self, _status: &str) {}
}

impl<F> PresentationSink for F
where
    F: FnMut(MeasurementResult) + Send,
{
    fn on_result(&mut self, result: MeasurementResult) {
        self(result)
    }
}

// ----------------------------------------------------------------------------
// Tickers
// ----------------------------------------------------------------------------

/// Cancellation flag the ticker thread waits on.
#[derive(Debug, Default)]
pub struct StopSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        *self.guard() = true;
        self.cond.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.guard()
    }

    /// Wait up to `timeout`. Returns true if the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.guard();
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |raised| !*raised)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard
    }

    fn guard(&self) -> MutexGuard<'_, bool> {
        self.raised
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Source of sampling ticks.
pub trait Ticker: Send + 'static {
    /// Block until the next tick. Returns false once `stop` is raised or the
    /// ticker has no more ticks to give.
    fn wait_tick(&mut self, stop: &StopSignal) -> bool;
}

/// Wall-clock ticker firing every `interval`.
#[derive(Clone, Copy, Debug)]
pub struct IntervalTicker {
    interval: Duration,
}

impl IntervalTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for IntervalTicker {
    fn wait_tick(&mut self, stop: &StopSignal) -> bool {
        !stop.wait_timeout(self.interval)
    }
}

const MANUAL_POLL: Duration = Duration::from_millis(10);

/// Ticker driven explicitly through a [`TickHandle`].
pub struct ManualTicker {
    ticks: Receiver<()>,
}

/// Fires ticks for a [`ManualTicker`].
#[derive(Clone)]
pub struct TickHandle {
    ticks: Sender<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, TickHandle) {
        let (tx, rx) = mpsc::channel();
        (Self { ticks: rx }, TickHandle { ticks: tx })
    }
}

impl Ticker for ManualTicker {
    fn wait_tick(&mut self, stop: &StopSignal) -> bool {
        loop {
            if stop.is_raised() {
                return false;
            }
            match self.ticks.recv_timeout(MANUAL_POLL) {
                Ok(()) => return !stop.is_raised(),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }
}

impl TickHandle {
    /// Returns false if the ticker is gone.
    pub fn tick(&self) -> bool {
        self.ticks.send(()).is_ok()
    }
}

// ----------------------------------------------------------------------------
// Sampler
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
    Stopped,
}

/// Counters since `start`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub executed: u64,
    pub skipped_busy: u64,
    pub skipped_no_frame: u64,
    pub delivered: u64,
    pub discarded: u64,
    pub frames_received: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    executed: AtomicU64,
    skipped_busy: AtomicU64,
    skipped_no_frame: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
}

struct Delivery {
    active: bool,
    prior: Estimates,
    sink: Option<Box<dyn PresentationSink>>,
}

struct Shared {
    in_flight: AtomicBool,
    worker_gone: AtomicBool,
    delivery: Mutex<Delivery>,
    counters: Counters,
}

impl Shared {
    fn delivery(&self) -> MutexGuard<'_, Delivery> {
        self.delivery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct StreamingSampler {
    state: SamplerState,
    pipeline: Option<TwoStagePipeline>,
    slot: Arc<FrameSlot>,
    shared: Arc<Shared>,
    stop: Arc<StopSignal>,
    source: Option<Box<dyn FrameSource>>,
    ticker: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<TwoStagePipeline>>,
}

impl StreamingSampler {
    pub fn new(pipeline: TwoStagePipeline) -> Self {
        Self {
            state: SamplerState::Idle,
            pipeline: Some(pipeline),
            slot: Arc::new(FrameSlot::new()),
            shared: Arc::new(Shared {
                in_flight: AtomicBool::new(false),
                worker_gone: AtomicBool::new(false),
                delivery: Mutex::new(Delivery {
                    active: false,
                    prior: Estimates::default(),
                    sink: None,
                }),
                counters: Counters::default(),
            }),
            stop: Arc::new(StopSignal::new()),
            source: None,
            ticker: None,
            worker: None,
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Start sampling `source` every `interval`.
    pub fn start<S>(
        &mut self,
        source: Box<dyn FrameSource>,
        sink: S,
        interval: Duration,
    ) -> Result<()>
    where
        S: PresentationSink + 'static,
    {
        if interval.is_zero() {
            bail!("sampling interval must be > 0");
        }
        self.start_with_ticker(source, sink, IntervalTicker::new(interval))
    }

    /// Start with an explicit ticker. Idle -> Running.
    pub fn start_with_ticker<S, T>(
        &mut self,
        mut source: Box<dyn FrameSource>,
        sink: S,
        mut ticker: T,
    ) -> Result<()>
    where
        S: PresentationSink + 'static,
        T: Ticker,
    {
        if self.state != SamplerState::Idle {
            bail!("sampler can only be started once (state: {:?})", self.state);
        }
        let mut pipeline = self
            .pipeline
            .take()
            .ok_or_else(|| anyhow!("sampler has no pipeline"))?;

        if let Err(err) = source.start(Arc::clone(&self.slot)) {
            self.pipeline = Some(pipeline);
            return Err(err.context(format!("failed to start {} source", source.name())));
        }
        log::info!("sampler: started {} source", source.name());

        {
            let mut delivery = self.shared.delivery();
            delivery.active = true;
            delivery.sink = Some(Box::new(sink));
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Frame>();

        let shared = Arc::clone(&self.shared);
        let worker = std::thread::Builder::new()
            .name("sampler-inference".to_string())
            .spawn(move || {
                for frame in jobs_rx {
                    let _busy = InFlight(&shared);
                    let prior = shared.delivery().prior;
                    let result = pipeline.run(&frame, prior);
                    deliver(&shared, result);
                }
                pipeline
            });
        let worker = match worker {
            Ok(handle) => handle,
            Err(err) => {
                self.shared.delivery().active = false;
                source.stop();
                return Err(anyhow!("failed to spawn inference worker: {err}"));
            }
        };

        let shared = Arc::clone(&self.shared);
        let slot = Arc::clone(&self.slot);
        let stop = Arc::clone(&self.stop);
        let ticker_thread = std::thread::Builder::new()
            .name("sampler-ticker".to_string())
            .spawn(move || {
                while ticker.wait_tick(&stop) {
                    if !on_tick(&shared, &slot, &jobs_tx) {
                        log::error!("sampler: inference worker is gone, no further ticks");
                        break;
                    }
                }
            });
        let ticker_thread = match ticker_thread {
            Ok(handle) => handle,
            Err(err) => {
                // Dropping the sender side with the closure ends the worker.
                self.shared.delivery().active = false;
                source.stop();
                self.worker = Some(worker);
                self.state = SamplerState::Stopped;
                return Err(anyhow!("failed to spawn sampler ticker: {err}"));
            }
        };

        self.source = Some(source);
        self.worker = Some(worker);
        self.ticker = Some(ticker_thread);
        self.state = SamplerState::Running;
        Ok(())
    }

    /// Running -> Stopped. No result reaches the sink after this returns.
    ///
    /// A run already in flight is allowed to finish on the worker thread;
    /// its result is discarded. Stopping a sampler that is not running is a
    /// no-op.
    pub fn stop(&mut self) {
        if self.state != SamplerState::Running {
            return;
        }
        self.shared.delivery().active = false;
        self.stop.raise();
        if let Some(ticker) = self.ticker.take() {
            if ticker.join().is_err() {
                log::warn!("sampler ticker thread panicked");
            }
        }
        if let Some(mut source) = self.source.take() {
            source.stop();
            log::info!("sampler: released {} source", source.name());
        }
        self.slot.clear();
        self.shared.delivery().sink = None;
        self.state = SamplerState::Stopped;
    }

    pub fn is_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SamplerStats {
        let c = &self.shared.counters;
        SamplerStats {
            ticks: c.ticks.load(Ordering::SeqCst),
            executed: c.executed.load(Ordering::SeqCst),
            skipped_busy: c.skipped_busy.load(Ordering::SeqCst),
            skipped_no_frame: c.skipped_no_frame.load(Ordering::SeqCst),
            delivered: c.delivered.load(Ordering::SeqCst),
            discarded: c.discarded.load(Ordering::SeqCst),
            frames_received: self.slot.frames_received(),
        }
    }

    /// Estimates that will seed the next run.
    pub fn last_estimates(&self) -> Estimates {
        self.shared.delivery().prior
    }

    /// Stop if needed, wait for any in-flight run, and hand the pipeline back.
    pub fn into_pipeline(mut self) -> Result<TwoStagePipeline> {
        self.stop();
        if let Some(pipeline) = self.pipeline.take() {
            return Ok(pipeline);
        }
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("sampler has no pipeline"))?;
        worker
            .join()
            .map_err(|_| anyhow!("sampler inference worker panicked"))
    }
}

impl Drop for StreamingSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clears the in-flight flag when a run ends, including by panic.
struct InFlight<'a>(&'a Shared);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.worker_gone.store(true, Ordering::SeqCst);
        }
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Returns false once the worker can no longer take jobs.
fn on_tick(shared: &Shared, slot: &FrameSlot, jobs: &Sender<Frame>) -> bool {
    if shared.worker_gone.load(Ordering::SeqCst) {
        return false;
    }
    let counters = &shared.counters;
    counters.ticks.fetch_add(1, Ordering::SeqCst);

    let Some(frame) = slot.latest() else {
        counters.skipped_no_frame.fetch_add(1, Ordering::SeqCst);
        return true;
    };
    if shared
        .in_flight
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        log::debug!("sampler: inference in flight, skipping tick");
        counters.skipped_busy.fetch_add(1, Ordering::SeqCst);
        return true;
    }
    counters.executed.fetch_add(1, Ordering::SeqCst);
    if jobs.send(frame).is_err() {
        shared.in_flight.store(false, Ordering::SeqCst);
        return false;
    }
    true
}

fn deliver(shared: &Shared, result: MeasurementResult) {
    let mut delivery = shared.delivery();
    if !delivery.active {
        shared.counters.discarded.fetch_add(1, Ordering::SeqCst);
        return;
    }
    delivery.prior = result.estimates();
    if let Some(sink) = delivery.sink.as_mut() {
        if let Some(status) = result.status() {
            sink.on_status(status);
        }
        sink.on_result(result);
        shared.counters.delivered.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn stop_signal_wakes_waiters() {
        let signal = Arc::new(StopSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || signal.wait_timeout(Duration::from_secs(30)))
        };
        std::thread::sleep(Duration::from_millis(20));
        signal.raise();
        assert!(waiter.join().unwrap());
        assert!(signal.is_raised());
    }

    #[test]
    fn interval_ticker_ends_when_stopped() {
        let signal = StopSignal::new();
        let mut ticker = IntervalTicker::new(Duration::from_millis(5));
        assert!(ticker.wait_tick(&signal));
        signal.raise();
        let started = Instant::now();
        assert!(!ticker.wait_tick(&signal));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn manual_ticker_follows_handle() {
        let signal = StopSignal::new();
        let (mut ticker, handle) = ManualTicker::new();
        assert!(handle.tick());
        assert!(ticker.wait_tick(&signal));
        drop(handle);
        assert!(!ticker.wait_tick(&signal));
    }
}
