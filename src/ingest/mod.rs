//! Frame ingestion sources.
//!
//! Sources push frames into a shared [`FrameSlot`]; whoever consumes the slot
//! only ever sees the most recent frame. Available sources:
//! - `stub://...` synthetic stream (testing, demos)
//! - still image replay from a file or a directory of images
//! - manual feed driven by the embedding application (camera callbacks)
//!
//! Sources never store frames anywhere except the slot.

pub mod manual;
pub mod normalize;
pub mod still;
pub mod synthetic;

use anyhow::{anyhow, bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub use manual::{ManualFeed, ManualSource};
pub use normalize::{normalize_to_rgb, to_frame, PixelFormat};
pub use still::StillSource;
pub use synthetic::SyntheticSource;

use crate::config::SourceSettings;
use crate::frame::{Frame, FrameSlot};

/// Push-based producer of frames.
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Begin delivering frames into `slot`.
    fn start(&mut self, slot: Arc<FrameSlot>) -> Result<()>;

    /// Stop delivering and release whatever the source holds. Idempotent.
    fn stop(&mut self);
}

/// Pick a source for `settings.url`.
pub fn source_from_settings(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    if url.is_empty() {
        bail!("frame source url is empty");
    }
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    if url.contains("://") {
        bail!("unsupported frame source {url}: only stub:// and local paths");
    }
    Ok(Box::new(StillSource::new(settings.clone())?))
}

// ----------------------------------------------------------------------------
// Producer thread shared by the paced sources
// ----------------------------------------------------------------------------

const STOP_POLL: Duration = Duration::from_millis(20);

/// Background thread that calls `next` at `fps` and pushes into a slot.
pub(crate) struct Producer {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Producer {
    pub(crate) fn spawn<F>(
        name: &str,
        fps: u32,
        square_crop: bool,
        slot: Arc<FrameSlot>,
        mut next: F,
    ) -> Result<Self>
    where
        F: FnMut() -> Frame + Send + 'static,
    {
        if fps == 0 {
            bail!("{name}: target_fps must be > 0");
        }
        let period = Duration::from_secs_f64(1.0 / f64::from(fps));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = Arc::clone(&shutdown);
        let join = std::thread::Builder::new()
            .name(format!("source-{name}"))
            .spawn(move || {
                while !shutdown_thread.load(Ordering::SeqCst) {
                    let frame = next();
                    slot.push(if square_crop {
                        frame.center_square()
                    } else {
                        frame
                    });
                    pause(period, &shutdown_thread);
                }
            })
            .map_err(|err| anyhow!("failed to spawn {name} source thread: {err}"))?;
        Ok(Self {
            shutdown,
            join: Some(join),
        })
    }

    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("frame source thread panicked");
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep for `period`, waking early once `shutdown` is set.
fn pause(period: Duration, shutdown: &AtomicBool) {
    let mut remaining = period;
    while !remaining.is_zero() && !shutdown.load(Ordering::SeqCst) {
        let step = remaining.min(STOP_POLL);
        std::thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> SourceSettings {
        SourceSettings {
            url: url.to_string(),
            target_fps: 30,
            square_crop: false,
        }
    }

    #[test]
    fn stub_url_selects_synthetic_source() {
        let source = source_from_settings(&settings("stub://camera")).unwrap();
        assert_eq!(source.name(), "synthetic");
    }

    #[test]
    fn remote_and_empty_urls_are_rejected() {
        assert!(source_from_settings(&settings("rtsp://10.0.0.1/stream")).is_err());
        assert!(source_from_settings(&settings("  ")).is_err());
    }

    #[test]
    fn missing_path_is_rejected() {
        assert!(source_from_settings(&settings("/definitely/not/here.png")).is_err());
    }

    #[test]
    fn producer_rejects_zero_fps() {
        let slot = Arc::new(FrameSlot::new());
        assert!(Producer::spawn("t", 0, false, slot, || Frame::filled(1, 1, [0, 0, 0])).is_err());
    }
}
