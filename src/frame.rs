//! Frame buffer type.
//!
//! A `Frame` is a mutable RGB8 image buffer produced by the capture layer and
//! consumed by exactly one pipeline iteration:
//!
//! - The Pipeline Driver borrows it exclusively for the iteration.
//! - The Compositor mutates it in place.
//! - The core never retains it past the iteration; callers that need the
//!   pre-annotation image must `clone()` before composition.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::time::Instant;

/// Frames are always interleaved RGB8.
pub const FRAME_CHANNELS: u32 = 3;

/// One captured video frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    seq: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a raw interleaved RGB8 buffer. Called by the capture layer.
    ///
    /// Fails if the buffer length does not match `width * height * 3`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>, seq: u64) -> Result<Self> {
        let expected = width as usize * height as usize * FRAME_CHANNELS as usize;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer size mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("frame buffer rejected for {}x{}", width, height))?;
        Ok(Self {
            image,
            seq,
            captured_at: Instant::now(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u32 {
        FRAME_CHANNELS
    }

    /// Capture sequence number, monotonically increasing per source.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Monotonic capture instant.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Read-only pixel view.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Mutable pixel view. The compositor draws through this.
    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Raw interleaved RGB8 bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}
