use std::path::PathBuf;

use image::ExtendedColorType;
use tracing::{trace, warn};

use crate::decoder::DecodedImage;

/// Where displayed frames go. Called once per rendered frame; nothing is
/// returned to the receive loop.
pub trait FrameSink {
    fn render(&mut self, image: &DecodedImage);
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn render(&mut self, image: &DecodedImage) {
        (**self).render(image);
    }
}

/// Discards frames. Used when running without a display.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    rendered: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl FrameSink for HeadlessSink {
    fn render(&mut self, image: &DecodedImage) {
        self.rendered += 1;
        trace!(width = image.width, height = image.height, "frame rendered (headless)");
    }
}

/// Writes every `every`-th rendered frame to a PNG file, replacing the
/// previous snapshot. Write failures are logged and otherwise ignored.
pub struct SnapshotSink {
    path: PathBuf,
    every: u32,
    counter: u32,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>, every: u32) -> Self {
        Self {
            path: path.into(),
            every: every.max(1),
            counter: 0,
        }
    }
}

impl FrameSink for SnapshotSink {
    fn render(&mut self, image: &DecodedImage) {
        self.counter = self.counter.wrapping_add(1);
        if self.counter % self.every != 0 {
            return;
        }
        if let Err(e) = image::save_buffer(
            &self.path,
            &image.rgb,
            image.width,
            image.height,
            ExtendedColorType::Rgb8,
        ) {
            warn!(path = %self.path.display(), "snapshot write failed: {}", e);
        }
    }
}
