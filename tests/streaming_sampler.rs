use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use exophthalmometer::config::SourceSettings;
use exophthalmometer::ingest;
use exophthalmometer::{
    DetectorBackend, Frame, ManualFeed, ManualSource, ManualTicker, MeasurementResult,
    PipelineConfig, RawDetections, SamplerState, StreamingSampler, StubBackend, StubRegressor,
    TickHandle, TwoStagePipeline,
};

const WAIT: Duration = Duration::from_secs(5);

fn one_right_eye() -> RawDetections {
    RawDetections::new(vec![0.9, 0.1], vec![0.5, 0.5, 0.2, 0.3])
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Detector that blocks inside `detect` until released.
struct GatedDetector {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl DetectorBackend for GatedDetector {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn detect(&mut self, _input: &Frame, _iou: f32, _confidence: f32) -> Result<RawDetections> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        Ok(one_right_eye())
    }
}

/// Detector that records the first pixel of every input it sees.
struct RecordingDetector {
    seen: Arc<Mutex<Vec<u8>>>,
}

impl DetectorBackend for RecordingDetector {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn detect(&mut self, input: &Frame, _iou: f32, _confidence: f32) -> Result<RawDetections> {
        self.seen.lock().unwrap().push(input.as_rgb().get_pixel(0, 0)[0]);
        Ok(RawDetections::empty())
    }
}

/// Detector whose first run panics.
struct PanickingDetector;

impl DetectorBackend for PanickingDetector {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn detect(&mut self, _input: &Frame, _iou: f32, _confidence: f32) -> Result<RawDetections> {
        panic!("detector crashed");
    }
}

struct Harness {
    sampler: StreamingSampler,
    feed: ManualFeed,
    ticks: TickHandle,
    results: Receiver<MeasurementResult>,
}

fn start(detector: Box<dyn DetectorBackend>, regressor: StubRegressor) -> Harness {
    let pipeline = TwoStagePipeline::new(PipelineConfig::default(), detector, Box::new(regressor));
    let mut sampler = StreamingSampler::new(pipeline);
    let (source, feed) = ManualSource::new(false);
    let (ticker, ticks) = ManualTicker::new();
    let (tx, results) = mpsc::channel();
    sampler
        .start_with_ticker(
            Box::new(source),
            move |result: MeasurementResult| {
                let _ = tx.send(result);
            },
            ticker,
        )
        .unwrap();
    Harness {
        sampler,
        feed,
        ticks,
        results,
    }
}

fn gated() -> (GatedDetector, Receiver<()>, Sender<()>) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        GatedDetector {
            entered: entered_tx,
            release: release_rx,
        },
        entered_rx,
        release_tx,
    )
}

#[test]
fn busy_ticks_are_skipped_not_queued() {
    let (detector, entered, release) = gated();
    let h = start(Box::new(detector), StubRegressor::constant(17.0));
    assert!(h.feed.push(Frame::filled(320, 240, [50, 50, 50])));

    h.ticks.tick();
    entered.recv_timeout(WAIT).expect("first run started");
    assert!(h.sampler.is_in_flight());

    h.ticks.tick();
    h.ticks.tick();
    assert!(wait_until(|| h.sampler.stats().ticks == 3));
    let stats = h.sampler.stats();
    assert_eq!(stats.executed, 1);
    assert_eq!(stats.skipped_busy, 2);
    assert!(entered.try_recv().is_err());

    release.send(()).unwrap();
    let result = h.results.recv_timeout(WAIT).expect("first result");
    assert_eq!(result.right_mm(), 17.0);
    assert!(wait_until(|| !h.sampler.is_in_flight()));

    // The skipped ticks did not leave a backlog behind.
    assert!(h.results.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(entered.try_recv().is_err());

    h.ticks.tick();
    entered.recv_timeout(WAIT).expect("second run started");
    release.send(()).unwrap();
    h.results.recv_timeout(WAIT).expect("second result");
    assert_eq!(h.sampler.stats().delivered, 2);
}

#[test]
fn nothing_is_delivered_after_stop() {
    let (detector, entered, release) = gated();
    let mut h = start(Box::new(detector), StubRegressor::constant(17.0));
    h.feed.push(Frame::filled(64, 64, [0, 0, 0]));

    h.ticks.tick();
    entered.recv_timeout(WAIT).expect("run started");

    h.sampler.stop();
    assert_eq!(h.sampler.state(), SamplerState::Stopped);
    assert!(!h.feed.is_attached());

    release.send(()).unwrap();
    assert!(wait_until(|| h.sampler.stats().discarded == 1));
    assert!(h.results.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(h.sampler.stats().delivered, 0);

    // The ticker is gone once stopped.
    assert!(!h.ticks.tick());

    let pipeline = h.sampler.into_pipeline().expect("pipeline returned");
    assert_eq!(pipeline.config(), &PipelineConfig::default());
}

#[test]
fn ticks_without_a_frame_do_nothing() {
    let h = start(
        Box::new(StubBackend::fixed(one_right_eye())),
        StubRegressor::constant(1.0),
    );
    h.ticks.tick();
    h.ticks.tick();
    assert!(wait_until(|| h.sampler.stats().ticks == 2));
    let stats = h.sampler.stats();
    assert_eq!(stats.skipped_no_frame, 2);
    assert_eq!(stats.executed, 0);
    assert!(h.results.try_recv().is_err());
}

#[test]
fn worker_panic_releases_in_flight_and_stops_ticking() {
    let h = start(Box::new(PanickingDetector), StubRegressor::constant(1.0));
    h.feed.push(Frame::filled(32, 32, [0, 0, 0]));

    h.ticks.tick();
    assert!(wait_until(|| h.sampler.stats().executed == 1));
    assert!(wait_until(|| !h.sampler.is_in_flight()));

    // The ticker notices the dead worker and exits instead of counting
    // every later tick as busy.
    assert!(wait_until(|| !h.ticks.tick()));
    let stats = h.sampler.stats();
    assert_eq!(stats.executed, 1);
    assert_eq!(stats.skipped_busy, 0);
    assert_eq!(stats.delivered, 0);
    assert!(h.results.try_recv().is_err());
}

#[test]
fn latest_frame_wins() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let detector = RecordingDetector {
        seen: Arc::clone(&seen),
    };
    let h = start(Box::new(detector), StubRegressor::constant(1.0));

    h.feed.push(Frame::filled(32, 32, [10, 10, 10]));
    h.feed.push(Frame::filled(32, 32, [200, 200, 200]));
    h.ticks.tick();
    h.results.recv_timeout(WAIT).expect("result");

    assert_eq!(*seen.lock().unwrap(), vec![200]);
    assert_eq!(h.sampler.stats().frames_received, 2);
}

#[test]
fn previous_result_seeds_the_next_run() {
    let detector = StubBackend::new().then(one_right_eye()).then_fail("camera glare");
    let h = start(Box::new(detector), StubRegressor::constant(0.0).then(18.5));
    h.feed.push(Frame::filled(100, 100, [0, 0, 0]));

    h.ticks.tick();
    let first = h.results.recv_timeout(WAIT).expect("first result");
    assert_eq!(first.right_mm(), 18.5);
    assert!(wait_until(|| !h.sampler.is_in_flight()));

    h.ticks.tick();
    let second = h.results.recv_timeout(WAIT).expect("second result");
    assert_eq!(second.right_mm(), 18.5);
    assert!(second.status().unwrap().contains("camera glare"));
    assert_eq!(h.sampler.last_estimates().right_mm, 18.5);
}

#[test]
fn lifecycle_is_idle_running_stopped() {
    let pipeline = TwoStagePipeline::new(
        PipelineConfig::default(),
        Box::new(StubBackend::new()),
        Box::new(StubRegressor::constant(0.0)),
    );
    let mut sampler = StreamingSampler::new(pipeline);
    assert_eq!(sampler.state(), SamplerState::Idle);

    // Stop before start is a no-op.
    sampler.stop();
    assert_eq!(sampler.state(), SamplerState::Idle);

    let (source, _feed) = ManualSource::new(false);
    let (ticker, _ticks) = ManualTicker::new();
    sampler
        .start_with_ticker(Box::new(source), |_: MeasurementResult| {}, ticker)
        .unwrap();
    assert_eq!(sampler.state(), SamplerState::Running);

    let (again, _) = ManualSource::new(false);
    assert!(sampler
        .start(Box::new(again), |_: MeasurementResult| {}, Duration::from_millis(10))
        .is_err());

    sampler.stop();
    sampler.stop();
    assert_eq!(sampler.state(), SamplerState::Stopped);

    let (later, _) = ManualSource::new(false);
    assert!(sampler
        .start(Box::new(later), |_: MeasurementResult| {}, Duration::from_millis(10))
        .is_err());
}

#[test]
fn interval_sampling_over_synthetic_source() {
    let pipeline = TwoStagePipeline::new(
        PipelineConfig::default(),
        Box::new(StubBackend::new()),
        Box::new(StubRegressor::constant(0.0)),
    );
    let source = ingest::source_from_settings(&SourceSettings {
        url: "stub://camera".to_string(),
        target_fps: 60,
        square_crop: true,
    })
    .unwrap();
    let (tx, results) = mpsc::channel();
    let mut sampler = StreamingSampler::new(pipeline);
    sampler
        .start(
            source,
            move |result: MeasurementResult| {
                let _ = tx.send(result);
            },
            Duration::from_millis(20),
        )
        .unwrap();

    let first = results.recv_timeout(WAIT).expect("first result");
    results.recv_timeout(WAIT).expect("second result");
    sampler.stop();

    assert_eq!(first.annotated().dimensions(), (480, 480));
    let stats = sampler.stats();
    assert!(stats.ticks >= 2);
    assert!(stats.delivered >= 2);
    assert!(stats.frames_received >= 1);
}
