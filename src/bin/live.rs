//! live - periodic eye protrusion measurement over a frame source.
//!
//! Runs until Ctrl-C (or `--max-results`). The source, models and sampling
//! interval come from `EXO_CONFIG` and the `EXO_*` environment.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::mpsc::{self, Sender};

use exophthalmometer::ingest;
use exophthalmometer::{
    AppConfig, MeasurementResult, PresentationSink, StreamingSampler, TwoStagePipeline,
};

#[derive(Parser, Debug)]
#[command(
    name = "live",
    version,
    about = "Measure eye protrusion continuously from a frame source"
)]
struct Args {
    /// Stop after this many delivered results.
    #[arg(long, value_name = "N")]
    max_results: Option<u64>,
}

enum LiveEvent {
    Result,
    Shutdown,
}

/// Logs every result and reports it to the main thread.
struct LogSink {
    events: Sender<LiveEvent>,
}

impl PresentationSink for LogSink {
    fn on_result(&mut self, result: MeasurementResult) {
        let (w, h) = result.annotated().dimensions();
        log::info!("{} ({}x{})", result.summary(), w, h);
        let _ = self.events.send(LiveEvent::Result);
    }

    fn on_status(&mut self, status: &str) {
        log::warn!("{}", status);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = AppConfig::load()?;
    log::info!(
        "live: source={} interval={:?} detector={:?} regressor={:?}",
        cfg.source.url,
        cfg.sample_interval,
        cfg.detector.backend,
        cfg.regressor.backend
    );

    let mut pipeline =
        TwoStagePipeline::from_settings(cfg.pipeline.clone(), &cfg.detector, &cfg.regressor);
    pipeline.warm_up();
    let source = ingest::source_from_settings(&cfg.source)?;

    let (tx, rx) = mpsc::channel();
    let shutdown_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(LiveEvent::Shutdown);
    })
    .context("error setting Ctrl-C handler")?;

    let mut sampler = StreamingSampler::new(pipeline);
    sampler.start(source, LogSink { events: tx }, cfg.sample_interval)?;
    log::info!("live: sampling, press Ctrl-C to stop");

    let mut delivered = 0u64;
    while let Ok(event) = rx.recv() {
        match event {
            LiveEvent::Shutdown => {
                log::info!("shutdown signal received, stopping sampler...");
                break;
            }
            LiveEvent::Result => {
                delivered += 1;
                if args.max_results.is_some_and(|max| delivered >= max) {
                    log::info!("live: reached {} result(s)", delivered);
                    break;
                }
            }
        }
    }

    sampler.stop();
    let stats = sampler.stats();
    log::info!(
        "live: ticks={} executed={} skipped_busy={} skipped_no_frame={} delivered={} discarded={} frames={}",
        stats.ticks,
        stats.executed,
        stats.skipped_busy,
        stats.skipped_no_frame,
        stats.delivered,
        stats.discarded,
        stats.frames_received
    );
    log::info!("last estimates: {}", sampler.last_estimates());
    Ok(())
}
