//! V4L2 capture backend (feature: capture-v4l2).
//!
//! Opens a local device node (e.g., /dev/video0), negotiates an RGB3 format
//! and streams frames through a memory-mapped buffer queue.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::CaptureConfig;
use crate::frame::{Frame, FRAME_CHANNELS};

pub(crate) struct V4l2Capture {
    device_path: String,
    state: Option<V4l2State>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Capture {
    pub(crate) fn open(config: &CaptureConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.source)
            .with_context(|| format!("open v4l2 device {}", config.source))?;

        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Capture: failed to set format on {}: {}",
                    config.source,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Capture: failed to set fps on {}: {}",
                    config.source,
                    err
                );
            }
        }

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Capture: opened {} ({}x{})",
            config.source,
            format.width,
            format.height
        );
        Ok(Self {
            device_path: config.source.clone(),
            state: Some(state),
            frame_count: 0,
            active_width: format.width,
            active_height: format.height,
        })
    }

    pub(crate) fn read(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let expected =
            self.active_width as usize * self.active_height as usize * FRAME_CHANNELS as usize;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;
        if buf.len() < expected {
            return Err(anyhow!(
                "v4l2 buffer from {} too short: {} bytes, expected {}",
                self.device_path,
                buf.len(),
                expected
            ));
        }

        self.frame_count += 1;
        let mut pixels = buf.to_vec();
        pixels.truncate(expected);
        let frame = Frame::from_raw(
            self.active_width,
            self.active_height,
            pixels,
            self.frame_count,
        )?;
        Ok(Some(frame))
    }

    pub(crate) fn release(&mut self) {
        // Dropping the state tears down the stream and closes the device.
        if self.state.take().is_some() {
            log::debug!(
                "V4l2Capture: closed {} after {} frames",
                self.device_path,
                self.frame_count
            );
        }
    }

    pub(crate) fn active_width(&self) -> u32 {
        self.active_width
    }

    pub(crate) fn active_height(&self) -> u32 {
        self.active_height
    }
}
