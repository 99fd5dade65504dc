//! Synthetic frame source.
//!
//! `stub://` sources generate deterministic pattern frames without any
//! device. The identifier accepts query parameters so tests and demo runs
//! can script the stream:
//!
//! - `frames=N`: yield N frames, then end-of-stream
//! - `fail_at=N`: fail the Nth read once (exercises retry / graceful stop)
//! - `fps=N`: override pacing (0 disables it)
//!
//! Example: `stub://camera0?frames=120&fps=0`.
//!
//! Frames are identical within a "scene" and change every `SCENE_PERIOD`
//! frames, so a frame-diff detector sees motion only at scene boundaries.
//! That makes the stub a realistic workout for TTL overlay persistence.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::CaptureConfig;
use crate::frame::Frame;

/// Frames per synthetic scene.
const SCENE_PERIOD: u64 = 50;

#[derive(Debug)]
pub(crate) struct StubSource {
    width: u32,
    height: u32,
    pace: Option<Duration>,
    frame_budget: Option<u64>,
    fail_at: Option<u64>,
    fail_injected: bool,
    frame_count: u64,
    last_read_at: Option<Instant>,
}

impl StubSource {
    pub(crate) fn open(config: &CaptureConfig) -> Result<Self> {
        let params = StubParams::parse(&config.source)?;
        let fps = params.fps.unwrap_or(config.target_fps);
        let pace = if fps > 0 {
            Some(Duration::from_millis(1_000 / fps as u64))
        } else {
            None
        };
        log::info!("StubSource: opened {} (synthetic)", config.source);
        Ok(Self {
            width: config.width,
            height: config.height,
            pace,
            frame_budget: params.frames,
            fail_at: params.fail_at,
            fail_injected: false,
            frame_count: 0,
            last_read_at: None,
        })
    }

    pub(crate) fn read(&mut self) -> Result<Option<Frame>> {
        if let Some(budget) = self.frame_budget {
            if self.frame_count >= budget {
                return Ok(None);
            }
        }
        if let Some(fail_at) = self.fail_at {
            if !self.fail_injected && self.frame_count + 1 == fail_at {
                self.fail_injected = true;
                return Err(anyhow!("injected read failure at frame {}", fail_at));
            }
        }

        self.pace_read();
        self.frame_count += 1;
        let pixels = self.generate_scene_pixels();
        let frame = Frame::from_raw(self.width, self.height, pixels, self.frame_count)?;
        Ok(Some(frame))
    }

    pub(crate) fn release(&mut self) {
        log::debug!("StubSource: released after {} frames", self.frame_count);
    }

    /// Block until the configured inter-frame interval has elapsed.
    fn pace_read(&mut self) {
        if let (Some(pace), Some(last)) = (self.pace, self.last_read_at) {
            let elapsed = last.elapsed();
            if elapsed < pace {
                std::thread::sleep(pace - elapsed);
            }
        }
        if self.pace.is_some() {
            self.last_read_at = Some(Instant::now());
        }
    }

    /// Deterministic pattern pixels, constant within a scene.
    fn generate_scene_pixels(&self) -> Vec<u8> {
        let scene = (self.frame_count - 1) / SCENE_PERIOD;
        let pixel_count = self.width as usize * self.height as usize * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + scene * 31) % 256) as u8;
        }
        pixels
    }
}

struct StubParams {
    frames: Option<u64>,
    fail_at: Option<u64>,
    fps: Option<u32>,
}

impl StubParams {
    fn parse(source: &str) -> Result<Self> {
        let mut params = Self {
            frames: None,
            fail_at: None,
            fps: None,
        };
        let Some((_, query)) = source.split_once('?') else {
            return Ok(params);
        };
        for pair in query.split('&') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            match key {
                "frames" => params.frames = Some(parse_number(key, value)?),
                "fail_at" => params.fail_at = Some(parse_number(key, value)?),
                "fps" => params.fps = Some(parse_number(key, value)? as u32),
                _ => return Err(anyhow!("unknown stub parameter '{}'", key)),
            }
        }
        Ok(params)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter '{}' must be an integer, got '{}'", key, value))
}
