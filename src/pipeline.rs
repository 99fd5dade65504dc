//! Pipeline driver.
//!
//! Orchestrates one iteration per captured frame:
//!
//! ```text
//! read -> detect -> build annotations -> store.update -> snapshot (prunes)
//!      -> composite -> sink -> cancellation check
//! ```
//!
//! The driver is an explicit state machine:
//!
//! ```text
//! Idle -> Running -> Draining -> Terminated
//! ```
//!
//! `Terminated` is absorbing; a finished pipeline refuses to run again and a
//! new instance must be constructed. The transition through `Draining`
//! releases the capture handle, and it runs on every exit path: normal
//! end-of-stream, cooperative cancellation, or a stage failure (which is
//! re-propagated unmodified after release).
//!
//! Everything runs on the caller's thread. The only suspension point is the
//! blocking capture read; the cancellation signal is checked once per
//! iteration after the frame has been sunk, so cancellation is observed with
//! at most one frame of latency and never interrupts a stage call.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::capture::{CaptureConfig, CaptureSource, CaptureStats, ReadOutcome};
use crate::compose::{Compositor, CompositorConfig};
use crate::frame::Frame;
use crate::overlay::{AnnotationBatch, OverlaySnapshot, OverlayStore};

/// Default overlay time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2);
/// Default sink label.
pub const DEFAULT_SINK_LABEL: &str = "Video";

/// Detection stage: pure transform of a frame into an optional result.
///
/// The result type is opaque to the driver; it is forwarded by value to the
/// annotation builder. Failures propagate to the pipeline caller.
pub trait Detector {
    type Detection;

    fn detect(&mut self, frame: &Frame) -> Result<Option<Self::Detection>>;
}

/// Annotation stage: turns a detection (or its absence) and the current
/// frame into a batch of new overlay items. An empty batch is a legitimate
/// result and leaves existing overlays untouched.
pub trait AnnotationBuilder<D> {
    fn build(&mut self, detection: Option<D>, frame: &Frame) -> Result<AnnotationBatch>;
}

/// Output stage: consumes the composited frame. Invoked synchronously;
/// the loop blocks until it returns.
pub trait Sink {
    fn consume(&mut self, frame: &Frame, snapshot: &OverlaySnapshot) -> Result<()>;
}

/// Cooperative cancellation handle.
///
/// Clone one end into a signal handler (or any other thread) and trigger it;
/// the pipeline observes the trigger at its per-iteration checkpoint.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Frame source identifier (e.g., "stub://camera0" or "/dev/video0").
    pub source: String,
    /// Overlay time-to-live. Must be positive.
    pub ttl: Duration,
    /// Label handed to the sink stage (e.g., a window title).
    pub sink_label: String,
    /// Bounded retries for failing capture reads (0 = none).
    pub max_read_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: "stub://camera0".to_string(),
            ttl: DEFAULT_TTL,
            sink_label: DEFAULT_SINK_LABEL.to_string(),
            max_read_retries: 0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(anyhow!("pipeline source must not be empty"));
        }
        if self.ttl.is_zero() {
            return Err(anyhow!("pipeline ttl must be greater than zero"));
        }
        Ok(())
    }
}

/// Driver lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Terminated,
}

/// Why a successful run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Cancelled,
}

/// One live frame-processing pipeline.
///
/// Owns its capture handle and overlay store exclusively for its whole
/// lifetime; nothing else touches them, so no locking is involved.
pub struct Pipeline<D, B, S>
where
    D: Detector,
    B: AnnotationBuilder<D::Detection>,
    S: Sink,
{
    config: PipelineConfig,
    state: PipelineState,
    source: CaptureSource,
    store: OverlayStore,
    compositor: Compositor,
    detector: D,
    builder: B,
    sink: S,
    cancel: CancelSignal,
    frames_processed: u64,
}

impl<D, B, S> Pipeline<D, B, S>
where
    D: Detector,
    B: AnnotationBuilder<D::Detection>,
    S: Sink,
{
    /// Open the frame source and assemble a pipeline.
    ///
    /// The capture device is acquired here; an unopenable source surfaces a
    /// `DeviceUnavailable` error before any iteration runs.
    pub fn open(
        config: PipelineConfig,
        detector: D,
        builder: B,
        sink: S,
        cancel: CancelSignal,
    ) -> Result<Self> {
        Self::open_with_compositor(config, detector, builder, sink, cancel, None)
    }

    /// Like [`Pipeline::open`], with an explicit compositor configuration.
    pub fn open_with_compositor(
        config: PipelineConfig,
        detector: D,
        builder: B,
        sink: S,
        cancel: CancelSignal,
        compositor: Option<CompositorConfig>,
    ) -> Result<Self> {
        config.validate()?;
        let store = OverlayStore::new(config.ttl)?;
        let compositor = Compositor::new(compositor.unwrap_or_default())?;
        let capture_config = CaptureConfig {
            source: config.source.clone(),
            max_read_retries: config.max_read_retries,
            ..CaptureConfig::default()
        };
        let source = CaptureSource::open(capture_config)?;
        Ok(Self {
            config,
            state: PipelineState::Idle,
            source,
            store,
            compositor,
            detector,
            builder,
            sink,
            cancel,
            frames_processed: 0,
        })
    }

    /// Run the pipeline to completion.
    ///
    /// Returns the stop reason on a clean stop (end-of-stream or
    /// cancellation). A stage failure is propagated unmodified, but only
    /// after the capture handle has been released. A pipeline can run once;
    /// subsequent calls fail.
    pub fn run(&mut self) -> Result<StopReason> {
        if self.state != PipelineState::Idle {
            return Err(anyhow!(
                "pipeline has already run; construct a new instance to restart"
            ));
        }

        self.state = PipelineState::Running;
        log::info!(
            "pipeline running: source={} ttl={:?} sink={}",
            self.config.source,
            self.config.ttl,
            self.config.sink_label
        );

        let outcome = self.drive();

        self.state = PipelineState::Draining;
        self.source.release();
        self.state = PipelineState::Terminated;

        match &outcome {
            Ok(reason) => log::info!(
                "pipeline stopped: {:?} after {} frames",
                reason,
                self.frames_processed
            ),
            Err(err) => log::error!(
                "pipeline failed after {} frames: {}",
                self.frames_processed,
                err
            ),
        }
        outcome
    }

    /// The per-frame loop. Every early return funnels back through `run`,
    /// which owns the Draining transition and the capture release.
    fn drive(&mut self) -> Result<StopReason> {
        loop {
            let mut frame = match self.source.read()? {
                ReadOutcome::Frame(frame) => frame,
                ReadOutcome::EndOfStream => return Ok(StopReason::EndOfStream),
            };

            let detection = self.detector.detect(&frame)?;
            let batch = self.builder.build(detection, &frame)?;

            let now = Instant::now();
            self.store.update(batch, now);
            let snapshot = self.store.render_snapshot(now);
            self.compositor.render(&mut frame, &snapshot);
            self.sink.consume(&frame, &snapshot)?;
            self.frames_processed += 1;

            if self.cancel.is_triggered() {
                return Ok(StopReason::Cancelled);
            }
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Overlay entries currently held (expired entries may be counted until
    /// the next snapshot prunes them).
    pub fn overlay_len(&self) -> usize {
        self.store.len()
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.source.stats()
    }

    pub fn sink_label(&self) -> &str {
        &self.config.sink_label
    }

    /// Access the sink stage (e.g., to inspect what it consumed).
    pub fn sink(&self) -> &S {
        &self.sink
    }
}
