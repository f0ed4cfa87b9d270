//! Image values flowing through the pipeline.
//!
//! - `Frame`: immutable RGB image. Every operation returns a new `Frame`; the
//!   pixel buffer is shared, so cloning is cheap.
//! - `FrameSlot`: single-slot "latest frame" store between a frame source and
//!   the streaming sampler. Last write wins; there is no backlog.

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ----------------------------------------------------------------------------
// Frame: immutable image buffer
// ----------------------------------------------------------------------------

/// Immutable RGB image.
///
/// There is no way to mutate the pixels of a `Frame` in place. Resizing,
/// cropping and rotation all produce fresh frames, so a result handed to a
/// sink can never change underneath it.
#[derive(Clone, Debug)]
pub struct Frame {
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::from_rgb(image.into_rgb8())
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb_bytes(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::from_rgb(image))
    }

    /// Decode an image file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        Ok(Self::from_dynamic(image))
    }

    /// Solid-color frame, mostly useful for synthetic sources and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_rgb(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Owned copy of the pixels, for callers that need to draw.
    pub fn to_rgb(&self) -> RgbImage {
        self.image.as_ref().clone()
    }

    /// Packed RGB24 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// True when both frames share the same pixel buffer.
    pub fn same_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    /// Resize to exactly `width` x `height`, ignoring aspect ratio.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Frame::from_rgb(imageops::resize(
            self.image.as_ref(),
            width,
            height,
            FilterType::Triangle,
        ))
    }

    /// Sub-image in pixel coordinates. The region must lie inside the frame;
    /// use `crop::crop` for rectangles that still need clamping.
    pub(crate) fn region(&self, x: u32, y: u32, width: u32, height: u32) -> Frame {
        Frame::from_rgb(imageops::crop_imm(self.image.as_ref(), x, y, width, height).to_image())
    }

    /// Largest centered square.
    pub fn center_square(&self) -> Frame {
        let (w, h) = self.dimensions();
        let side = w.min(h);
        if side == w && side == h {
            return self.clone();
        }
        self.region((w - side) / 2, (h - side) / 2, side, side)
    }

    /// Clockwise rotation.
    pub fn rotated(&self, rotation: Rotation) -> Frame {
        let image = self.image.as_ref();
        match rotation {
            Rotation::None => self.clone(),
            Rotation::Cw90 => Frame::from_rgb(imageops::rotate90(image)),
            Rotation::Cw180 => Frame::from_rgb(imageops::rotate180(image)),
            Rotation::Cw270 => Frame::from_rgb(imageops::rotate270(image)),
        }
    }

    /// Encode to disk; the format follows the file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.image
            .save(path)
            .with_context(|| format!("failed to write image {}", path.display()))
    }
}

/// Clockwise rotation in quarter turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Result<Self> {
        match degrees % 360 {
            0 => Ok(Self::None),
            90 => Ok(Self::Cw90),
            180 => Ok(Self::Cw180),
            270 => Ok(Self::Cw270),
            other => Err(anyhow!("rotation must be a multiple of 90, got {}", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// FrameSlot: latest-frame store
// ----------------------------------------------------------------------------

/// Holds only the most recent frame pushed by a source.
///
/// Older frames that were never read are dropped on overwrite. This is the
/// only state shared between the ingest activity and the sampler's ticker.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
    received: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, replacing whatever was there.
    pub fn push(&self, frame: Frame) {
        let mut guard = self
            .latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(frame);
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent frame, if any. The slot keeps it for later ticks.
    pub fn latest(&self) -> Option<Frame> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drop the stored frame.
    pub fn clear(&self) {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    /// Total frames pushed since creation.
    pub fn frames_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
