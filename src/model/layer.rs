//! Layer variants composing the rendered view.
//!
//! A layer is one rendering unit in a viewport's z-ordered stack. The
//! variant set is closed: intensity (channel) layers, segmentation/object
//! layers, and ad-hoc result layers produced by tool results. Dispatch is
//! explicit over [`LayerKind`]; there is no layer inheritance.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::color::Color;
use crate::constants::{DEFAULT_BRIGHTNESS, DEFAULT_OPACITY, DEFAULT_WINDOW_MAX, DEFAULT_WINDOW_MIN};
use crate::model::visual::{ObjectId, Visual};

/// Unique identifier of a layer within one viewport.
pub type LayerId = String;

/// Errors raised by layer configuration and stack operations.
#[derive(Error, Debug)]
pub enum LayerError {
    /// A layer with the same id already exists in the stack
    #[error("duplicate layer id: {id}")]
    DuplicateLayer {
        /// The colliding layer id
        id: LayerId,
    },

    /// Intensity window bounds are not strictly ordered
    #[error("invalid intensity range: min {min} must be < max {max}")]
    InvalidRange {
        /// Rejected lower bound
        min: f32,
        /// Rejected upper bound
        max: f32,
    },

    /// The referenced layer is not in the stack
    #[error("unknown layer id: {id}")]
    UnknownLayer {
        /// The missing layer id
        id: LayerId,
    },
}

/// Rendering unit for one channel at one (tpoint, zplane), with
/// windowing, brightness and tint parameters.
///
/// `min`/`max` are fractions of the sensor range and window the raw
/// intensities; they are only mutable through [`ChannelLayer::set_range`]
/// so the `min < max` invariant cannot be broken.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLayer {
    /// Channel name (imaging modality) this layer renders.
    pub channel: String,
    /// Time point this layer belongs to.
    pub tpoint: u32,
    /// Z-plane this layer belongs to.
    pub zplane: u32,
    /// Lowest raw intensity the sensor can produce.
    pub min_intensity: f32,
    /// Highest raw intensity the sensor can produce.
    pub max_intensity: f32,
    /// Additive blending with other visible channel layers.
    pub additive: bool,
    /// Tint applied to the normalized intensity.
    pub tint: Color,
    min: f32,
    max: f32,
    brightness: f32,
}

impl ChannelLayer {
    /// Create a channel layer with the full sensor range windowed in and a
    /// white tint.
    pub fn new(channel: impl Into<String>, tpoint: u32, zplane: u32, max_intensity: f32) -> Self {
        Self {
            channel: channel.into(),
            tpoint,
            zplane,
            min_intensity: 0.0,
            max_intensity,
            additive: true,
            tint: Color::default(),
            min: DEFAULT_WINDOW_MIN,
            max: DEFAULT_WINDOW_MAX,
            brightness: DEFAULT_BRIGHTNESS,
        }
    }

    /// Lower bound of the intensity window, as a fraction of the sensor range.
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound of the intensity window, as a fraction of the sensor range.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Brightness offset added after windowing.
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// Set the intensity window.
    ///
    /// Fails with [`LayerError::InvalidRange`] when `min >= max`, leaving
    /// the previous window untouched.
    pub fn set_range(&mut self, min: f32, max: f32) -> Result<(), LayerError> {
        if min >= max {
            return Err(LayerError::InvalidRange { min, max });
        }
        self.min = min;
        self.max = max;
        Ok(())
    }

    /// Set the brightness offset, clamped to `[0, 1]`.
    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }

    /// Windowed, brightness-shifted intensity in `[0, 1]` for one raw
    /// sensor value.
    pub fn transform_intensity(&self, raw: f32) -> f32 {
        let normalized = raw / self.max_intensity;
        ((normalized - self.min) / (self.max - self.min) + self.brightness).clamp(0.0, 1.0)
    }

    /// Normalized RGB contribution of this layer for one raw intensity,
    /// already scaled by the layer opacity.
    pub fn contribution(&self, raw: f32, opacity: f32) -> [f32; 3] {
        self.tint
            .scaled_components(self.transform_intensity(raw) * opacity)
    }
}

/// Rendering unit for the segmentation outlines of one object type.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationLayer {
    /// Object type whose outlines this layer paints (e.g. `"cells"`).
    pub object_type: String,
    fill_color: Color,
    stroke_color: Color,
    visuals: BTreeMap<ObjectId, Visual>,
}

impl SegmentationLayer {
    /// Create an empty segmentation layer with the given default colors.
    pub fn new(object_type: impl Into<String>, fill_color: Color, stroke_color: Color) -> Self {
        Self {
            object_type: object_type.into(),
            fill_color,
            stroke_color,
            visuals: BTreeMap::new(),
        }
    }

    /// Layer-wide default fill color.
    pub fn fill_color(&self) -> Color {
        self.fill_color
    }

    /// Layer-wide default stroke color.
    pub fn stroke_color(&self) -> Color {
        self.stroke_color
    }

    /// Hex form of the default fill color, for UI binding.
    pub fn fill_color_hex(&self) -> String {
        self.fill_color.to_hex()
    }

    /// Hex form of the default stroke color, for UI binding.
    pub fn stroke_color_hex(&self) -> String {
        self.stroke_color.to_hex()
    }

    /// Set the layer-wide fill color. Returns whether anything changed;
    /// setting the current color is a no-op.
    pub fn set_fill_color(&mut self, color: Color) -> bool {
        if self.fill_color == color {
            return false;
        }
        self.fill_color = color;
        true
    }

    /// Set the layer-wide stroke color. Returns whether anything changed;
    /// setting the current color is a no-op.
    pub fn set_stroke_color(&mut self, color: Color) -> bool {
        if self.stroke_color == color {
            return false;
        }
        self.stroke_color = color;
        true
    }

    /// Insert or replace the visual for one object.
    pub fn insert_visual(&mut self, id: ObjectId, visual: Visual) {
        self.visuals.insert(id, visual);
    }

    /// Visual for one object, if present.
    pub fn visual(&self, id: ObjectId) -> Option<&Visual> {
        self.visuals.get(&id)
    }

    /// Mutable visual for one object, if present.
    pub fn visual_mut(&mut self, id: ObjectId) -> Option<&mut Visual> {
        self.visuals.get_mut(&id)
    }

    /// All object ids this layer knows about, in ascending order.
    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.visuals.keys().copied()
    }

    /// Whether the given object has a visual in this layer.
    pub fn contains_object(&self, id: ObjectId) -> bool {
        self.visuals.contains_key(&id)
    }

    /// Number of visuals in this layer.
    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    /// Whether this layer has no visuals.
    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }
}

/// Ad-hoc layer of result visuals, produced only by a tool result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultLayer {
    visuals: BTreeMap<ObjectId, Visual>,
}

impl ResultLayer {
    /// Create an empty result layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the visual for one object.
    pub fn insert_visual(&mut self, id: ObjectId, visual: Visual) {
        self.visuals.insert(id, visual);
    }

    /// Visual for one object, if present.
    pub fn visual(&self, id: ObjectId) -> Option<&Visual> {
        self.visuals.get(&id)
    }

    /// Number of visuals in this layer.
    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    /// Whether this layer has no visuals.
    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }
}

/// The closed set of layer variants.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Intensity layer for one channel at one (tpoint, zplane).
    Channel(ChannelLayer),
    /// Segmentation outlines for one object type.
    Segmentation(SegmentationLayer),
    /// Ad-hoc visuals from a tool result.
    Result(ResultLayer),
}

/// One rendering unit in a viewport's layer stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Unique id within the owning viewport.
    pub id: LayerId,
    /// User-controlled visibility flag.
    pub visible: bool,
    /// Z position; paint order is back-to-front by ascending value.
    pub z_index: i32,
    /// The variant payload.
    pub kind: LayerKind,
    opacity: f32,
}

impl Layer {
    fn new(id: impl Into<LayerId>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            visible: true,
            opacity: DEFAULT_OPACITY,
            z_index: 0,
            kind,
        }
    }

    /// Create a channel layer.
    pub fn channel(id: impl Into<LayerId>, channel: ChannelLayer) -> Self {
        Self::new(id, LayerKind::Channel(channel))
    }

    /// Create a segmentation layer.
    pub fn segmentation(id: impl Into<LayerId>, segmentation: SegmentationLayer) -> Self {
        Self::new(id, LayerKind::Segmentation(segmentation))
    }

    /// Create a result layer.
    pub fn result(id: impl Into<LayerId>, result: ResultLayer) -> Self {
        Self::new(id, LayerKind::Result(result))
    }

    /// Layer opacity in `[0, 1]`.
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Set the layer opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    /// Whether this layer currently contributes to the composite at all.
    pub fn contributes(&self) -> bool {
        self.visible && self.opacity > 0.0
    }

    /// Channel payload, if this is a channel layer.
    pub fn as_channel(&self) -> Option<&ChannelLayer> {
        match &self.kind {
            LayerKind::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    /// Mutable channel payload, if this is a channel layer.
    pub fn as_channel_mut(&mut self) -> Option<&mut ChannelLayer> {
        match &mut self.kind {
            LayerKind::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    /// Segmentation payload, if this is a segmentation layer.
    pub fn as_segmentation(&self) -> Option<&SegmentationLayer> {
        match &self.kind {
            LayerKind::Segmentation(segmentation) => Some(segmentation),
            _ => None,
        }
    }

    /// Mutable segmentation payload, if this is a segmentation layer.
    pub fn as_segmentation_mut(&mut self) -> Option<&mut SegmentationLayer> {
        match &mut self.kind {
            LayerKind::Segmentation(segmentation) => Some(segmentation),
            _ => None,
        }
    }

    /// Result payload, if this is a result layer.
    pub fn as_result(&self) -> Option<&ResultLayer> {
        match &self.kind {
            LayerKind::Result(result) => Some(result),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_channel() -> ChannelLayer {
        ChannelLayer::new("dapi", 0, 0, 4095.0)
    }

    #[test]
    fn test_windowed_midpoint() {
        let mut channel = test_channel();
        channel.set_range(0.2, 0.8).expect("valid range");
        let transformed = channel.transform_intensity(0.5 * 4095.0);
        assert!((transformed - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_transform_clamps_outside_window() {
        let mut channel = test_channel();
        channel.set_range(0.2, 0.8).expect("valid range");
        assert_eq!(channel.transform_intensity(0.0), 0.0);
        assert_eq!(channel.transform_intensity(4095.0), 1.0);
    }

    #[test]
    fn test_transform_monotonic_within_window() {
        let mut channel = test_channel();
        channel.set_range(0.1, 0.9).expect("valid range");
        channel.set_brightness(0.05);
        let mut previous = -1.0f32;
        for step in 0..=100 {
            let raw = 4095.0 * step as f32 / 100.0;
            let transformed = channel.transform_intensity(raw);
            assert!(transformed >= previous, "not monotonic at raw={raw}");
            assert!((0.0..=1.0).contains(&transformed));
            previous = transformed;
        }
    }

    #[test]
    fn test_invalid_range_leaves_window_unchanged() {
        let mut channel = test_channel();
        channel.set_range(0.25, 0.75).expect("valid range");
        let err = channel.set_range(0.9, 0.1).expect_err("inverted range");
        assert!(matches!(err, LayerError::InvalidRange { .. }));
        assert_eq!(channel.min(), 0.25);
        assert_eq!(channel.max(), 0.75);
    }

    #[test]
    fn test_contribution_scales_tint_and_opacity() {
        let mut channel = test_channel();
        channel.tint = Color::rgb(255, 0, 0);
        channel.set_range(0.0, 1.0).expect("valid range");
        let [r, g, b] = channel.contribution(4095.0, 0.5);
        assert!((r - 0.5).abs() < 1e-6);
        assert_eq!(g, 0.0);
        assert_eq!(b, 0.0);
    }

    #[test]
    fn test_segmentation_color_set_is_idempotent() {
        let mut layer =
            SegmentationLayer::new("cells", Color::rgb(0, 0, 255), Color::rgb(255, 255, 255));
        assert!(!layer.set_fill_color(Color::rgb(0, 0, 255)));
        assert!(layer.set_fill_color(Color::rgb(0, 255, 0)));
        assert_eq!(layer.fill_color_hex(), "#00ff00");
    }

    #[test]
    fn test_layer_contributes() {
        let mut layer = Layer::channel("dapi-0-0", test_channel());
        assert!(layer.contributes());
        layer.set_opacity(0.0);
        assert!(!layer.contributes());
        layer.set_opacity(0.7);
        layer.visible = false;
        assert!(!layer.contributes());
    }
}
