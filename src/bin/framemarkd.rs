//! framemarkd - live overlay pipeline daemon
//!
//! This daemon:
//! 1. Opens the configured frame source (stub:// or /dev/video*)
//! 2. Runs the built-in frame-diff detector and highlight builder
//! 3. Keeps detection overlays on screen for the configured TTL
//! 4. Hands composited frames to a logging sink
//! 5. Drains and releases the capture handle on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use framemark::{
    scan_devices, CancelSignal, DaemonConfig, Frame, FrameDiffDetector, HighlightBuilder, LogSink,
    OverlaySnapshot, Pipeline, Sink,
};

#[derive(Parser, Debug)]
#[command(name = "framemarkd", about = "Live frame annotation pipeline daemon")]
struct Args {
    /// Frame source identifier (stub://name or /dev/videoN)
    #[arg(long)]
    source: Option<String>,
    /// Overlay time-to-live in milliseconds
    #[arg(long)]
    ttl_ms: Option<u64>,
    /// Label passed to the sink stage
    #[arg(long)]
    sink_label: Option<String>,
    /// Bounded retries for failing capture reads
    #[arg(long)]
    max_read_retries: Option<u32>,
    /// Probe capture devices and exit
    #[arg(long)]
    scan: bool,
    /// Stop after this many frames (bounded demo run)
    #[arg(long)]
    max_frames: Option<u64>,
}

/// Sink wrapper that triggers cooperative cancellation after a frame budget.
struct FrameLimit<S> {
    inner: S,
    remaining: Option<u64>,
    cancel: CancelSignal,
}

impl<S: Sink> Sink for FrameLimit<S> {
    fn consume(&mut self, frame: &Frame, snapshot: &OverlaySnapshot) -> Result<()> {
        self.inner.consume(frame, snapshot)?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                log::info!("frame budget reached, draining pipeline");
                self.cancel.trigger();
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.scan {
        let devices = scan_devices(8);
        if devices.is_empty() {
            log::info!("no openable capture devices found");
        }
        for device in devices {
            println!(
                "{} {}x{} @{}fps",
                device.source, device.width, device.height, device.target_fps
            );
        }
        return Ok(());
    }

    let mut cfg = DaemonConfig::load()?;
    if let Some(source) = args.source {
        cfg.source = source;
    }
    if let Some(ttl_ms) = args.ttl_ms {
        cfg.ttl = Duration::from_millis(ttl_ms);
    }
    if let Some(label) = args.sink_label {
        cfg.sink_label = label;
    }
    if let Some(retries) = args.max_read_retries {
        cfg.max_read_retries = retries;
    }

    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::info!("ctrl-c received, draining pipeline");
            cancel.trigger();
        })
        .context("install ctrl-c handler")?;
    }

    let sink = FrameLimit {
        inner: LogSink::new(cfg.sink_label.clone()),
        remaining: args.max_frames,
        cancel: cancel.clone(),
    };
    let mut pipeline = Pipeline::open(
        cfg.pipeline_config(),
        FrameDiffDetector::new(),
        HighlightBuilder::new(),
        sink,
        cancel,
    )?;

    log::info!(
        "framemarkd running: source={} ttl={:?} sink={}",
        cfg.source,
        cfg.ttl,
        cfg.sink_label
    );

    let reason = pipeline.run()?;
    let stats = pipeline.capture_stats();
    log::info!(
        "framemarkd exiting: {:?} after {} frames from {}",
        reason,
        stats.frames_read,
        stats.source
    );
    Ok(())
}
