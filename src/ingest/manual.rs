//! Manually fed source for embedding applications.
//!
//! The application keeps a [`ManualFeed`] and calls it from its own camera
//! callback; the [`ManualSource`] half is handed to the sampler. Frames pushed
//! while the source is not started are dropped.

use anyhow::Result;
use std::sync::{Arc, Mutex};

use super::normalize::{to_frame, PixelFormat};
use super::FrameSource;
use crate::frame::{Frame, FrameSlot};

#[derive(Default)]
struct FeedState {
    slot: Option<Arc<FrameSlot>>,
    square_crop: bool,
}

type Shared = Arc<Mutex<FeedState>>;

fn lock(state: &Shared) -> std::sync::MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ManualSource {
    state: Shared,
}

/// Producer handle for a [`ManualSource`]. Cheap to clone.
#[derive(Clone)]
pub struct ManualFeed {
    state: Shared,
}

impl ManualSource {
    pub fn new(square_crop: bool) -> (Self, ManualFeed) {
        let state = Arc::new(Mutex::new(FeedState {
            slot: None,
            square_crop,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            ManualFeed { state },
        )
    }
}

impl FrameSource for ManualSource {
    fn name(&self) -> &str {
        "manual"
    }

    fn start(&mut self, slot: Arc<FrameSlot>) -> Result<()> {
        lock(&self.state).slot = Some(slot);
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.state).slot = None;
    }
}

impl ManualFeed {
    /// Deliver a frame. Returns false if the source is not running.
    pub fn push(&self, frame: Frame) -> bool {
        let state = lock(&self.state);
        match &state.slot {
            Some(slot) => {
                slot.push(if state.square_crop {
                    frame.center_square()
                } else {
                    frame
                });
                true
            }
            None => false,
        }
    }

    /// Convert a raw camera buffer and deliver it.
    pub fn push_raw(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<bool> {
        let frame = to_frame(pixels, width, height, format)?;
        Ok(self.push(frame))
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.state).slot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_flow_only_while_started() {
        let (mut source, feed) = ManualSource::new(false);
        let slot = Arc::new(FrameSlot::new());

        assert!(!feed.push(Frame::filled(2, 2, [0, 0, 0])));
        source.start(Arc::clone(&slot)).unwrap();
        assert!(feed.is_attached());
        assert!(feed.push(Frame::filled(2, 2, [0, 0, 0])));
        source.stop();
        assert!(!feed.push(Frame::filled(2, 2, [0, 0, 0])));
        assert_eq!(slot.frames_received(), 1);
    }

    #[test]
    fn raw_buffers_are_normalized_and_squared() {
        let (mut source, feed) = ManualSource::new(true);
        let slot = Arc::new(FrameSlot::new());
        source.start(Arc::clone(&slot)).unwrap();

        let bgra = vec![0u8; 8 * 4 * 4];
        assert!(feed.push_raw(&bgra, 8, 4, PixelFormat::Bgra32).unwrap());
        assert_eq!(slot.latest().unwrap().dimensions(), (4, 4));
        assert!(feed.push_raw(&bgra[..10], 8, 4, PixelFormat::Bgra32).is_err());
    }
}
