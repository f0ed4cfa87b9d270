//! Still image replay source.
//!
//! Replays one image, or every image in a directory in file-name order, at
//! the configured frame rate. Local paths only; images are decoded once when
//! the source is built.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FrameSource, Producer};
use crate::config::SourceSettings;
use crate::frame::{Frame, FrameSlot};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct StillSource {
    settings: SourceSettings,
    frames: Arc<Vec<Frame>>,
    producer: Option<Producer>,
}

impl StillSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        let root = PathBuf::from(settings.url.trim());
        let paths = image_paths(&root)?;
        let frames = paths
            .iter()
            .map(Frame::open)
            .collect::<Result<Vec<_>>>()?;
        log::info!(
            "StillSource: loaded {} image(s) from {}",
            frames.len(),
            root.display()
        );
        Ok(Self {
            settings,
            frames: Arc::new(frames),
            producer: None,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for StillSource {
    fn name(&self) -> &str {
        "still"
    }

    fn start(&mut self, slot: Arc<FrameSlot>) -> Result<()> {
        self.stop();
        let frames = Arc::clone(&self.frames);
        let mut index = 0usize;
        self.producer = Some(Producer::spawn(
            self.name(),
            self.settings.target_fps,
            self.settings.square_crop,
            slot,
            move || {
                let frame = frames[index % frames.len()].clone();
                index = index.wrapping_add(1);
                frame
            },
        )?);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
    }
}

fn image_paths(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        bail!("image source {} does not exist", root.display());
    }
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("failed to list {}", root.display()))?
    {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    if paths.is_empty() {
        return Err(anyhow!("no images found in {}", root.display()));
    }
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
