//! TTL-bounded overlay store.
//!
//! This is the data structure that turns flickering per-frame detections into
//! stable on-screen overlays. Every annotation is stored with its creation
//! instant and kept for a fixed time-to-live; a detector that misses a few
//! frames leaves the existing overlays untouched, so they keep rendering
//! until they age out.
//!
//! The store is exclusively owned by the Pipeline Driver. Pruning is eager
//! and fused into `render_snapshot`, which keeps the store bounded by
//! `ttl x arrival rate` without background threads, timers or locks.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

/// Annotation categories. Each category is ordered and pruned independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Polygons,
    Texts,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Polygons, Category::Texts];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Polygons => "polygons",
            Category::Texts => "texts",
        }
    }
}

/// A 2D point in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Stroke style for polygon overlays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrokeStyle {
    /// RGB stroke color.
    pub color: [u8; 3],
    /// Stroke thickness in pixels.
    pub thickness: u32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: [0, 255, 0],
            thickness: 2,
        }
    }
}

/// Style for text overlays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    /// RGB text color.
    pub color: [u8; 3],
    /// Glyph height in pixels.
    pub scale: f32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            color: [255, 0, 0],
            scale: 16.0,
        }
    }
}

/// A closed polygon drawn as a stroke through its ordered vertices.
#[derive(Clone, Debug, PartialEq)]
pub struct PolygonOverlay {
    pub points: Vec<Point>,
    pub stroke: StrokeStyle,
}

/// A text label anchored at a frame position.
#[derive(Clone, Debug, PartialEq)]
pub struct TextOverlay {
    pub content: String,
    pub anchor: Point,
    pub style: TextStyle,
}

/// One overlay item, tagged by category.
#[derive(Clone, Debug, PartialEq)]
pub enum Annotation {
    Polygon(PolygonOverlay),
    Text(TextOverlay),
}

impl Annotation {
    pub fn category(&self) -> Category {
        match self {
            Annotation::Polygon(_) => Category::Polygons,
            Annotation::Text(_) => Category::Texts,
        }
    }
}

/// New annotations produced by one pipeline iteration.
///
/// An empty batch is the normal outcome of a frame with no detection; the
/// store treats it as a no-op for every category.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnnotationBatch {
    pub polygons: Vec<PolygonOverlay>,
    pub texts: Vec<TextOverlay>,
}

impl AnnotationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, annotation: Annotation) {
        match annotation {
            Annotation::Polygon(poly) => self.polygons.push(poly),
            Annotation::Text(text) => self.texts.push(text),
        }
    }

    pub fn polygon(mut self, points: Vec<Point>, stroke: StrokeStyle) -> Self {
        self.polygons.push(PolygonOverlay { points, stroke });
        self
    }

    pub fn text(mut self, content: impl Into<String>, anchor: Point, style: TextStyle) -> Self {
        self.texts.push(TextOverlay {
            content: content.into(),
            anchor,
            style,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.polygons.len() + self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.texts.is_empty()
    }
}

/// Read-only view of the unexpired overlays, ordered by insertion within
/// each category.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlaySnapshot {
    pub polygons: Vec<PolygonOverlay>,
    pub texts: Vec<TextOverlay>,
}

impl OverlaySnapshot {
    pub fn len(&self) -> usize {
        self.polygons.len() + self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.texts.is_empty()
    }
}

/// TTL-bounded, multi-category annotation cache.
///
/// All operations take `now` explicitly so the pipeline controls the clock
/// and tests can probe expiry boundaries without sleeping.
pub struct OverlayStore {
    ttl: Duration,
    polygons: Vec<(PolygonOverlay, Instant)>,
    texts: Vec<(TextOverlay, Instant)>,
}

impl OverlayStore {
    /// Create a store with the given time-to-live. The TTL must be positive.
    pub fn new(ttl: Duration) -> Result<Self> {
        if ttl.is_zero() {
            return Err(anyhow!("overlay ttl must be greater than zero"));
        }
        Ok(Self {
            ttl,
            polygons: Vec::new(),
            texts: Vec::new(),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Append the batch's items with creation time `now`, preserving arrival
    /// order within each category.
    ///
    /// A category absent from the batch is left untouched: existing unexpired
    /// entries are never cleared or reordered by an update. This is what
    /// keeps overlays stable across frames where the detector comes up empty.
    pub fn update(&mut self, batch: AnnotationBatch, now: Instant) {
        self.polygons
            .extend(batch.polygons.into_iter().map(|poly| (poly, now)));
        self.texts
            .extend(batch.texts.into_iter().map(|text| (text, now)));
    }

    /// Drop every entry older than the TTL. Remaining order is unchanged.
    /// Runs in time proportional to the current store size.
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.polygons
            .retain(|(_, created)| now.duration_since(*created) <= ttl);
        self.texts
            .retain(|(_, created)| now.duration_since(*created) <= ttl);
    }

    /// Prune, then return an ordered read-only view per category.
    ///
    /// Pruning and snapshotting are fused so the store is never observed in
    /// an expired state.
    pub fn render_snapshot(&mut self, now: Instant) -> OverlaySnapshot {
        self.prune(now);
        OverlaySnapshot {
            polygons: self.polygons.iter().map(|(poly, _)| poly.clone()).collect(),
            texts: self.texts.iter().map(|(text, _)| text.clone()).collect(),
        }
    }

    /// Number of stored entries across all categories, expired or not.
    pub fn len(&self) -> usize {
        self.polygons.len() + self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.texts.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn text_item(content: &str) -> TextOverlay {
        TextOverlay {
            content: content.to_string(),
            anchor: Point::new(20, 30),
            style: TextStyle::default(),
        }
    }

    fn triangle() -> PolygonOverlay {
        PolygonOverlay {
            points: vec![Point::new(0, 0), Point::new(10, 0), Point::new(5, 8)],
            stroke: StrokeStyle::default(),
        }
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn rejects_zero_ttl() {
        assert!(OverlayStore::new(Duration::ZERO).is_err());
    }

    #[test]
    fn entry_expires_after_ttl() -> Result<()> {
        // ttl = 2.0s; insert text A at t=0; visible at 1.9s, gone at 2.1s.
        let mut store = OverlayStore::new(Duration::from_secs(2))?;
        let base = Instant::now();

        let batch = AnnotationBatch::new().text("A", Point::new(5, 5), TextStyle::default());
        store.update(batch, base);

        let fresh = store.render_snapshot(at(base, 1_900));
        assert_eq!(fresh.texts.len(), 1);
        assert_eq!(fresh.texts[0].content, "A");

        let expired = store.render_snapshot(at(base, 2_100));
        assert!(expired.texts.is_empty());
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn categories_age_independently() -> Result<()> {
        // ttl = 1.0s; polygon P at t=0, text T at t=0.5.
        let mut store = OverlayStore::new(Duration::from_secs(1))?;
        let base = Instant::now();

        let mut first = AnnotationBatch::new();
        first.push(Annotation::Polygon(triangle()));
        store.update(first, base);

        let mut second = AnnotationBatch::new();
        second.push(Annotation::Text(text_item("T")));
        store.update(second, at(base, 500));

        let both = store.render_snapshot(at(base, 900));
        assert_eq!(both.polygons.len(), 1);
        assert_eq!(both.texts.len(), 1);

        let only_text = store.render_snapshot(at(base, 1_100));
        assert!(only_text.polygons.is_empty());
        assert_eq!(only_text.texts.len(), 1);
        assert_eq!(only_text.texts[0].content, "T");

        let neither = store.render_snapshot(at(base, 1_600));
        assert!(neither.is_empty());
        Ok(())
    }

    #[test]
    fn empty_update_never_clobbers_existing_entries() -> Result<()> {
        let mut store = OverlayStore::new(Duration::from_secs(2))?;
        let base = Instant::now();

        let batch = AnnotationBatch::new()
            .text("first", Point::new(0, 0), TextStyle::default())
            .text("second", Point::new(0, 20), TextStyle::default());
        store.update(batch, base);

        // A run of detector misses produces empty batches.
        for i in 1..=5 {
            store.update(AnnotationBatch::new(), at(base, i * 100));
        }

        let snapshot = store.render_snapshot(at(base, 600));
        let contents: Vec<&str> = snapshot
            .texts
            .iter()
            .map(|text| text.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "second"]);
        Ok(())
    }

    #[test]
    fn update_preserves_insertion_order_within_category() -> Result<()> {
        let mut store = OverlayStore::new(Duration::from_secs(5))?;
        let base = Instant::now();

        for i in 0..4 {
            let batch = AnnotationBatch::new().text(
                format!("t{}", i),
                Point::new(0, i * 10),
                TextStyle::default(),
            );
            store.update(batch, at(base, i as u64 * 10));
        }

        let snapshot = store.render_snapshot(at(base, 100));
        let contents: Vec<&str> = snapshot
            .texts
            .iter()
            .map(|text| text.content.as_str())
            .collect();
        assert_eq!(contents, vec!["t0", "t1", "t2", "t3"]);
        Ok(())
    }

    #[test]
    fn snapshot_is_stable_without_updates() -> Result<()> {
        let mut store = OverlayStore::new(Duration::from_secs(2))?;
        let base = Instant::now();

        let mut batch = AnnotationBatch::new();
        batch.push(Annotation::Polygon(triangle()));
        batch.push(Annotation::Text(text_item("label")));
        store.update(batch, base);

        let first = store.render_snapshot(at(base, 500));
        let second = store.render_snapshot(at(base, 500));
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn prune_drops_only_expired_entries() -> Result<()> {
        let mut store = OverlayStore::new(Duration::from_millis(300))?;
        let base = Instant::now();

        store.update(
            AnnotationBatch::new().text("old", Point::new(0, 0), TextStyle::default()),
            base,
        );
        store.update(
            AnnotationBatch::new().text("new", Point::new(0, 0), TextStyle::default()),
            at(base, 200),
        );
        assert_eq!(store.len(), 2);

        store.prune(at(base, 400));
        assert_eq!(store.len(), 1);

        let snapshot = store.render_snapshot(at(base, 400));
        assert_eq!(snapshot.texts[0].content, "new");
        Ok(())
    }

    #[test]
    fn batch_push_routes_by_category() {
        let mut batch = AnnotationBatch::new();
        batch.push(Annotation::Polygon(triangle()));
        batch.push(Annotation::Text(text_item("x")));
        assert_eq!(batch.polygons.len(), 1);
        assert_eq!(batch.texts.len(), 1);
        assert_eq!(batch.len(), 2);

        assert_eq!(Annotation::Text(text_item("x")).category(), Category::Texts);
        assert_eq!(Category::Polygons.name(), "polygons");
    }
}
