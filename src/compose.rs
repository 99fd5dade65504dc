//! Overlay compositor.
//!
//! Pure rendering step: takes a frame and an overlay snapshot and draws the
//! snapshot onto the frame in place. Polygons become closed strokes through
//! their ordered vertices; texts are rasterized at their anchors.
//!
//! Malformed individual items (a polygon with fewer than 3 points, empty
//! text, zero-scale text) are skipped silently: one bad item must never take
//! down the persistence guarantee for the rest of the overlay set.

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut};
use std::path::{Path, PathBuf};

use crate::frame::Frame;
use crate::overlay::{OverlaySnapshot, PolygonOverlay, StrokeStyle, TextOverlay};

/// Well-known system font locations probed when no explicit path is given.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
];

/// Configuration for the compositor.
#[derive(Clone, Debug)]
pub struct CompositorConfig {
    /// Explicit TrueType/OpenType font path for text overlays.
    pub font_path: Option<PathBuf>,
    /// Probe well-known system font locations when no path is given.
    pub discover_system_fonts: bool,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            discover_system_fonts: true,
        }
    }
}

/// Draws overlay snapshots onto frames.
pub struct Compositor {
    font: Option<FontArc>,
}

impl Compositor {
    /// Build a compositor, loading the text font.
    ///
    /// An explicit `font_path` that cannot be loaded is an error. When no
    /// path is given, system locations are probed; a host with no usable
    /// font still gets a working compositor, with text items skipped and a
    /// single warning logged.
    pub fn new(config: CompositorConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => Some(load_font(path)?),
            None if config.discover_system_fonts => discover_font(),
            None => None,
        };
        if font.is_none() {
            log::warn!("Compositor: no usable font found, text overlays will not be drawn");
        }
        Ok(Self { font })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw the snapshot onto the frame in place.
    ///
    /// The frame is destructively borrowed: callers that need the
    /// pre-annotation image must clone it first. Rendering the same snapshot
    /// twice with no store mutation in between produces identical content.
    pub fn render(&self, frame: &mut Frame, snapshot: &OverlaySnapshot) {
        let image = frame.image_mut();
        for poly in &snapshot.polygons {
            draw_polygon(image, poly);
        }
        for text in &snapshot.texts {
            self.draw_text(image, text);
        }
    }

    fn draw_text(&self, image: &mut RgbImage, text: &TextOverlay) {
        if text.content.is_empty() || text.style.scale <= 0.0 {
            return;
        }
        let Some(font) = &self.font else {
            return;
        };
        draw_text_mut(
            image,
            Rgb(text.style.color),
            text.anchor.x,
            text.anchor.y,
            PxScale::from(text.style.scale),
            font,
            &text.content,
        );
    }
}

/// Closed stroke through the polygon's ordered vertices.
///
/// Degenerate polygons (fewer than 3 points) are skipped.
fn draw_polygon(image: &mut RgbImage, poly: &PolygonOverlay) {
    if poly.points.len() < 3 {
        return;
    }
    for i in 0..poly.points.len() {
        let a = poly.points[i];
        let b = poly.points[(i + 1) % poly.points.len()];
        draw_segment(
            image,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            &poly.stroke,
        );
    }
}

/// Approximate a thick stroke by drawing parallel one-pixel lines offset
/// along the axis perpendicular to the segment's dominant direction.
fn draw_segment(image: &mut RgbImage, a: (f32, f32), b: (f32, f32), stroke: &StrokeStyle) {
    let color = Rgb(stroke.color);
    let thickness = stroke.thickness.max(1) as i32;
    let horizontal = (b.0 - a.0).abs() >= (b.1 - a.1).abs();
    for i in 0..thickness {
        let offset = (i - thickness / 2) as f32;
        let (start, end) = if horizontal {
            ((a.0, a.1 + offset), (b.0, b.1 + offset))
        } else {
            ((a.0 + offset, a.1), (b.0 + offset, b.1))
        };
        draw_line_segment_mut(image, start, end, color);
    }
}

fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read overlay font {}", path.display()))?;
    FontArc::try_from_vec(bytes)
        .with_context(|| format!("parse overlay font {}", path.display()))
}

fn discover_font() -> Option<FontArc> {
    for candidate in SYSTEM_FONT_CANDIDATES {
        let path = Path::new(candidate);
        if !path.exists() {
            continue;
        }
        match load_font(path) {
            Ok(font) => {
                log::debug!("Compositor: using font {}", candidate);
                return Some(font);
            }
            Err(err) => {
                log::debug!("Compositor: skipping font {}: {}", candidate, err);
            }
        }
    }
    None
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
