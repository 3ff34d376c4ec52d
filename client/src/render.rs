//! Rendering collaborator seam.
//!
//! The sync core never paints. It hands finished [`StrokeSegment`]s and
//! clear requests to a [`Renderer`] supplied by the host.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use envelope::{DrawPayload, PathPayload, Point};

/// Color used for legacy `draw` points that carry none.
pub const LEGACY_DRAW_COLOR: &str = "#000000";
/// Width used for legacy `draw` points that carry none.
pub const LEGACY_DRAW_WIDTH: f64 = 2.0;

/// One run of points to paint.
///
/// Points are in sampling order. A single point is a dot, not a line.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeSegment {
    pub points: Vec<Point>,
    pub author_id: String,
    pub color: String,
    pub stroke_width: f64,
}

impl StrokeSegment {
    /// True when this segment paints a single dot.
    #[must_use]
    pub fn is_dot(&self) -> bool {
        self.points.len() == 1
    }
}

impl From<PathPayload> for StrokeSegment {
    fn from(path: PathPayload) -> Self {
        Self { points: path.points, author_id: path.id, color: path.color, stroke_width: path.stroke_width }
    }
}

impl From<DrawPayload> for StrokeSegment {
    fn from(draw: DrawPayload) -> Self {
        Self {
            points: vec![Point::new(draw.x, draw.y)],
            author_id: draw.id,
            color: draw.color.unwrap_or_else(|| LEGACY_DRAW_COLOR.to_owned()),
            stroke_width: draw.stroke_width.unwrap_or(LEGACY_DRAW_WIDTH),
        }
    }
}

/// Paints segments onto the shared surface.
pub trait Renderer: Send {
    /// Paint one segment.
    fn draw_segment(&mut self, segment: &StrokeSegment);

    /// Erase the whole surface.
    fn clear_surface(&mut self);
}

/// Renderer that paints nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn draw_segment(&mut self, _segment: &StrokeSegment) {}

    fn clear_surface(&mut self) {}
}
