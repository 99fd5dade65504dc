//! Pipeline lifecycle tests: state transitions, guaranteed capture release,
//! stage failure propagation and cooperative cancellation.

use anyhow::{anyhow, Result};

use framemark::{
    AnnotationBatch, AnnotationBuilder, CancelSignal, CollectSink, Detector, DeviceUnavailable,
    Frame, FrameDiffDetector, HighlightBuilder, OverlaySnapshot, Pipeline, PipelineConfig,
    PipelineState, Sink, StopReason,
};

fn stub_pipeline_config(source: &str) -> PipelineConfig {
    PipelineConfig {
        source: source.to_string(),
        ..PipelineConfig::default()
    }
}

/// Detector that produces nothing until it fails at a scripted iteration.
struct FailingDetector {
    fail_on_call: u64,
    calls: u64,
}

impl Detector for FailingDetector {
    type Detection = ();

    fn detect(&mut self, _frame: &Frame) -> Result<Option<()>> {
        self.calls += 1;
        if self.calls == self.fail_on_call {
            return Err(anyhow!("detector exploded"));
        }
        Ok(None)
    }
}

/// Builder that always returns an empty batch.
struct EmptyBuilder;

impl<D> AnnotationBuilder<D> for EmptyBuilder {
    fn build(&mut self, _detection: Option<D>, _frame: &Frame) -> Result<AnnotationBatch> {
        Ok(AnnotationBatch::new())
    }
}

struct FailingSink;

impl Sink for FailingSink {
    fn consume(&mut self, _frame: &Frame, _snapshot: &OverlaySnapshot) -> Result<()> {
        Err(anyhow!("sink rejected the frame"))
    }
}

#[test]
fn end_of_stream_drains_and_terminates() -> Result<()> {
    // The source would run forever but is scripted to end after 3 frames.
    let mut pipeline = Pipeline::open(
        stub_pipeline_config("stub://cam?frames=3&fps=0"),
        FrameDiffDetector::new(),
        HighlightBuilder::new(),
        CollectSink::new(),
        CancelSignal::new(),
    )?;
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let reason = pipeline.run()?;

    assert_eq!(reason, StopReason::EndOfStream);
    assert_eq!(pipeline.state(), PipelineState::Terminated);
    assert_eq!(pipeline.frames_processed(), 3);
    let stats = pipeline.capture_stats();
    assert!(stats.released);
    assert_eq!(stats.frames_read, 3);
    Ok(())
}

#[test]
fn detector_failure_propagates_after_release() -> Result<()> {
    // Detector raises on iteration 2 of an otherwise endless source.
    let mut pipeline = Pipeline::open(
        stub_pipeline_config("stub://cam?fps=0"),
        FailingDetector {
            fail_on_call: 2,
            calls: 0,
        },
        EmptyBuilder,
        CollectSink::new(),
        CancelSignal::new(),
    )?;

    let err = pipeline.run().unwrap_err();

    // The caller sees the detector's own error, not a replacement.
    assert_eq!(err.to_string(), "detector exploded");
    assert_eq!(pipeline.state(), PipelineState::Terminated);
    assert!(pipeline.capture_stats().released);
    assert_eq!(pipeline.frames_processed(), 1);
    Ok(())
}

#[test]
fn sink_failure_propagates_after_release() -> Result<()> {
    let mut pipeline = Pipeline::open(
        stub_pipeline_config("stub://cam?fps=0"),
        FrameDiffDetector::new(),
        EmptyBuilder,
        FailingSink,
        CancelSignal::new(),
    )?;

    let err = pipeline.run().unwrap_err();

    assert_eq!(err.to_string(), "sink rejected the frame");
    assert!(pipeline.capture_stats().released);
    assert_eq!(pipeline.state(), PipelineState::Terminated);
    Ok(())
}

#[test]
fn cancellation_is_observed_with_one_frame_latency() -> Result<()> {
    let cancel = CancelSignal::new();
    cancel.trigger();

    let mut pipeline = Pipeline::open(
        stub_pipeline_config("stub://cam?fps=0"),
        FrameDiffDetector::new(),
        HighlightBuilder::new(),
        CollectSink::new(),
        cancel,
    )?;

    let reason = pipeline.run()?;

    // The in-flight frame is still composited and sunk before the stop.
    assert_eq!(reason, StopReason::Cancelled);
    assert_eq!(pipeline.frames_processed(), 1);
    assert_eq!(pipeline.sink().records.len(), 1);
    assert!(pipeline.capture_stats().released);
    Ok(())
}

#[test]
fn terminated_pipeline_refuses_to_restart() -> Result<()> {
    let mut pipeline = Pipeline::open(
        stub_pipeline_config("stub://cam?frames=1&fps=0"),
        FrameDiffDetector::new(),
        HighlightBuilder::new(),
        CollectSink::new(),
        CancelSignal::new(),
    )?;
    pipeline.run()?;
    assert_eq!(pipeline.state(), PipelineState::Terminated);

    let err = pipeline.run().unwrap_err();
    assert!(err.to_string().contains("already run"));
    assert_eq!(pipeline.state(), PipelineState::Terminated);
    Ok(())
}

#[test]
fn unopenable_source_fails_before_any_iteration() {
    let err = Pipeline::open(
        stub_pipeline_config("rtsp://nowhere"),
        FrameDiffDetector::new(),
        HighlightBuilder::new(),
        CollectSink::new(),
        CancelSignal::new(),
    )
    .err()
    .expect("open must fail");
    assert!(err.downcast_ref::<DeviceUnavailable>().is_some());
}

#[test]
fn overlays_persist_across_frames_without_detections() -> Result<()> {
    // The stub source changes scene every 50 frames; the frame-diff detector
    // fires exactly once, at the boundary. With a TTL far longer than the
    // run, the overlay must keep rendering on every later frame.
    let mut config = stub_pipeline_config("stub://cam?frames=60&fps=0");
    config.ttl = std::time::Duration::from_secs(60);
    let mut pipeline = Pipeline::open(
        config,
        FrameDiffDetector::new(),
        HighlightBuilder::new(),
        CollectSink::new(),
        CancelSignal::new(),
    )?;

    let reason = pipeline.run()?;
    assert_eq!(reason, StopReason::EndOfStream);

    let records = &pipeline.sink().records;
    assert_eq!(records.len(), 60);

    // No overlays before the scene change at frame 51.
    assert!(records[..50]
        .iter()
        .all(|record| record.polygons == 0 && record.texts == 0));
    // The detection frame and every frame after it carry the overlay.
    assert!(records[50..]
        .iter()
        .all(|record| record.polygons == 1 && record.texts == 1));
    Ok(())
}
