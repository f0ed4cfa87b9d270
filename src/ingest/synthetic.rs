//! Synthetic `stub://` source.
//!
//! Produces a moving gradient so downstream stages see changing content
//! without a camera attached.

use anyhow::Result;
use image::{Rgb, RgbImage};
use std::sync::Arc;

use super::{FrameSource, Producer};
use crate::config::SourceSettings;
use crate::frame::{Frame, FrameSlot};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

pub struct SyntheticSource {
    settings: SourceSettings,
    producer: Option<Producer>,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            settings,
            producer: None,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn start(&mut self, slot: Arc<FrameSlot>) -> Result<()> {
        self.stop();
        let mut frame_count: u64 = 0;
        self.producer = Some(Producer::spawn(
            self.name(),
            self.settings.target_fps,
            self.settings.square_crop,
            slot,
            move || {
                frame_count += 1;
                synthetic_frame(frame_count)
            },
        )?);
        log::info!("SyntheticSource: streaming {} (synthetic)", self.settings.url);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
    }
}

fn synthetic_frame(frame_count: u64) -> Frame {
    // Scene shifts every 50 frames.
    let scene = (frame_count / 50) as u32;
    let shift = frame_count as u32;
    Frame::from_rgb(RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Rgb([
            ((x + shift) % 256) as u8,
            ((y + scene * 17) % 256) as u8,
            ((x + y + shift) % 256) as u8,
        ])
    }))
}
