//! Renderable shape primitives attached to layers.

use crate::color::Color;

/// Unique identifier of a segmentation object (e.g. one cell).
pub type ObjectId = u64;

/// Minimum number of vertices required for a valid polygon outline.
pub const MIN_POLYGON_VERTICES: usize = 3;

/// Shape geometry for a visual, in map coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Single point marker (e.g. an object centroid).
    Point { x: f64, y: f64 },
    /// Closed polygon outline.
    Polygon { vertices: Vec<(f64, f64)> },
}

impl Geometry {
    /// Check that the geometry is well-formed enough to paint.
    pub fn is_valid(&self) -> bool {
        match self {
            Geometry::Point { .. } => true,
            Geometry::Polygon { vertices } => vertices.len() >= MIN_POLYGON_VERTICES,
        }
    }
}

/// A single renderable shape with optional fill and stroke colors.
///
/// A visual is owned by exactly one layer and is destroyed with it. Colors
/// left as `None` fall back to the owning layer's defaults; a per-visual
/// color (e.g. per-class coloring from a tool result) overrides them.
#[derive(Debug, Clone, PartialEq)]
pub struct Visual {
    /// The shape geometry.
    pub geometry: Geometry,
    /// Fill color override; `None` uses the layer default.
    pub fill_color: Option<Color>,
    /// Stroke color override; `None` uses the layer default.
    pub stroke_color: Option<Color>,
}

impl Visual {
    /// Create a visual with no color overrides.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            fill_color: None,
            stroke_color: None,
        }
    }

    /// Create a point visual at the given position.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(Geometry::Point { x, y })
    }

    /// Create a polygon visual from its vertices.
    pub fn polygon(vertices: Vec<(f64, f64)>) -> Self {
        Self::new(Geometry::Polygon { vertices })
    }

    /// Builder: set the fill color override.
    pub fn with_fill_color(mut self, color: Color) -> Self {
        self.fill_color = Some(color);
        self
    }

    /// Builder: set the stroke color override.
    pub fn with_stroke_color(mut self, color: Color) -> Self {
        self.stroke_color = Some(color);
        self
    }

    /// Effective fill color given the owning layer's default.
    pub fn effective_fill(&self, layer_default: Color) -> Color {
        self.fill_color.unwrap_or(layer_default)
    }

    /// Effective stroke color given the owning layer's default.
    pub fn effective_stroke(&self, layer_default: Color) -> Color {
        self.stroke_color.unwrap_or(layer_default)
    }
}
