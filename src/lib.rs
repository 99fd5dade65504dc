//! framemark - live frame annotation pipeline with TTL-persistent overlays.
//!
//! The pipeline composes a pluggable detection stage with a pluggable
//! annotation-producing stage, and keeps the resulting overlays on screen
//! for a fixed time window. Intermittent or flickering detections therefore
//! render as stable overlays: a detector that misses a frame produces an
//! empty annotation batch, which never disturbs the overlays already stored.
//!
//! # Module Structure
//!
//! - `capture`: frame sources (stub, V4L2) with guaranteed handle release
//! - `overlay`: the TTL-bounded multi-category annotation store
//! - `compose`: draws overlay snapshots onto frames
//! - `pipeline`: the driver state machine and its stage contracts
//! - `stages`: built-in reference detector / builder / sinks
//! - `config`: daemon configuration loading
//! - `frame`: the RGB frame buffer type
//!
//! # Ownership
//!
//! Everything is single-threaded and cooperatively scheduled. Each pipeline
//! instance exclusively owns its capture handle and overlay store; the only
//! cross-thread artifact is the [`CancelSignal`], so a signal handler can
//! request a stop that the loop observes once per iteration.

pub mod capture;
pub mod compose;
pub mod config;
pub mod frame;
pub mod overlay;
pub mod pipeline;
pub mod stages;

pub use capture::{
    scan_devices, CaptureConfig, CaptureSource, CaptureStats, DeviceInfo, DeviceUnavailable,
    ReadOutcome,
};
pub use compose::{Compositor, CompositorConfig};
pub use config::DaemonConfig;
pub use frame::{Frame, FRAME_CHANNELS};
pub use overlay::{
    Annotation, AnnotationBatch, Category, OverlaySnapshot, OverlayStore, Point, PolygonOverlay,
    StrokeStyle, TextOverlay, TextStyle,
};
pub use pipeline::{
    AnnotationBuilder, CancelSignal, Detector, Pipeline, PipelineConfig, PipelineState, Sink,
    StopReason, DEFAULT_SINK_LABEL, DEFAULT_TTL,
};
pub use stages::{
    CollectSink, FrameDiffDetector, HighlightBuilder, LogSink, MotionDetection, SinkRecord,
};
