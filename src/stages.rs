//! Built-in reference stages.
//!
//! The pipeline's detector, annotation builder and sink are caller-supplied.
//! These implementations are the defaults used by the daemon and the test
//! suite; real deployments substitute their own.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::frame::Frame;
use crate::overlay::{AnnotationBatch, OverlaySnapshot, Point, StrokeStyle, TextStyle};
use crate::pipeline::{AnnotationBuilder, Detector, Sink};

/// A detected frame change.
#[derive(Clone, Debug)]
pub struct MotionDetection {
    /// Bounding region of the change, in pixel coordinates.
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// Hash-comparison motion detector.
///
/// Hashes each frame and reports motion when the hash differs from the
/// previous frame's. The first frame never reports motion (there is nothing
/// to compare against). The reported region is a fixed inset of the frame;
/// a real detector would localize the change.
#[derive(Default)]
pub struct FrameDiffDetector {
    last_hash: Option<[u8; 32]>,
}

impl FrameDiffDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for FrameDiffDetector {
    type Detection = MotionDetection;

    fn detect(&mut self, frame: &Frame) -> Result<Option<MotionDetection>> {
        let current: [u8; 32] = Sha256::digest(frame.as_bytes()).into();
        let motion = match self.last_hash {
            Some(previous) => previous != current,
            None => false,
        };
        self.last_hash = Some(current);

        if !motion {
            return Ok(None);
        }
        let inset_x = frame.width() / 10;
        let inset_y = frame.height() / 10;
        Ok(Some(MotionDetection {
            x: inset_x as i32,
            y: inset_y as i32,
            width: frame.width() - 2 * inset_x,
            height: frame.height() - 2 * inset_y,
            confidence: 0.85,
        }))
    }
}

/// Turns a motion detection into a highlight polygon plus a label anchored
/// above it. No detection means an empty batch; existing overlays keep
/// rendering until their TTL runs out.
pub struct HighlightBuilder {
    pub stroke: StrokeStyle,
    pub label_style: TextStyle,
    events: u64,
}

impl HighlightBuilder {
    pub fn new() -> Self {
        Self {
            stroke: StrokeStyle::default(),
            label_style: TextStyle::default(),
            events: 0,
        }
    }

    pub fn events(&self) -> u64 {
        self.events
    }
}

impl Default for HighlightBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationBuilder<MotionDetection> for HighlightBuilder {
    fn build(
        &mut self,
        detection: Option<MotionDetection>,
        _frame: &Frame,
    ) -> Result<AnnotationBatch> {
        let Some(motion) = detection else {
            return Ok(AnnotationBatch::new());
        };
        self.events += 1;

        let right = motion.x + motion.width as i32;
        let bottom = motion.y + motion.height as i32;
        let outline = vec![
            Point::new(motion.x, motion.y),
            Point::new(right, motion.y),
            Point::new(right, bottom),
            Point::new(motion.x, bottom),
        ];
        // Label above the region, clamped so it stays on screen.
        let anchor = Point::new(motion.x, (motion.y - 10).max(20));
        let label = format!("motion #{} ({:.0}%)", self.events, motion.confidence * 100.0);

        Ok(AnnotationBatch::new()
            .polygon(outline, self.stroke)
            .text(label, anchor, self.label_style))
    }
}

/// Sink that logs consumed frames.
pub struct LogSink {
    label: String,
    frames_seen: u64,
}

impl LogSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            frames_seen: 0,
        }
    }
}

impl Sink for LogSink {
    fn consume(&mut self, frame: &Frame, snapshot: &OverlaySnapshot) -> Result<()> {
        self.frames_seen += 1;
        log::debug!(
            "{}: frame #{} {}x{} polygons={} texts={}",
            self.label,
            frame.seq(),
            frame.width(),
            frame.height(),
            snapshot.polygons.len(),
            snapshot.texts.len()
        );
        if self.frames_seen % 100 == 0 {
            log::info!("{}: {} frames displayed", self.label, self.frames_seen);
        }
        Ok(())
    }
}

/// What a `CollectSink` saw for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkRecord {
    pub seq: u64,
    pub polygons: usize,
    pub texts: usize,
}

/// Test-oriented sink that records per-frame overlay counts.
#[derive(Default)]
pub struct CollectSink {
    pub records: Vec<SinkRecord>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for CollectSink {
    fn consume(&mut self, frame: &Frame, snapshot: &OverlaySnapshot) -> Result<()> {
        self.records.push(SinkRecord {
            seq: frame.seq(),
            polygons: snapshot.polygons.len(),
            texts: snapshot.texts.len(),
        });
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
