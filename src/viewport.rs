//! Layer stack, plane navigation and composition for one open view.
//!
//! The viewport owns the ordered layer stack of one experiment view plus
//! the current (tpoint, zplane) indices and camera state. It does not
//! paint pixels itself: for channel layers it produces the per-layer
//! paint parameter records the external tile renderer consumes, and a
//! pure per-pixel compose helper mirrors the blend for tests.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::events::{EventBus, ViewerEvent};
use crate::model::{ChannelLayer, Layer, LayerError, LayerId, LayerKind, ObjectId};

/// Camera state of the map view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapState {
    /// Zoom level.
    pub zoom: f64,
    /// View center in map coordinates.
    pub center: (f64, f64),
    /// Map units per pixel.
    pub resolution: f64,
    /// View rotation in radians.
    pub rotation: f64,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            zoom: 0.0,
            center: (0.0, 0.0),
            resolution: 1.0,
            rotation: 0.0,
        }
    }
}

/// Paint parameters for one visible channel layer, in back-to-front
/// order. This record is the boundary to the external tile renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPaint {
    /// Id of the source layer.
    pub layer_id: LayerId,
    /// Channel name.
    pub channel: String,
    /// Tint color.
    pub tint: crate::color::Color,
    /// Lower window bound (fraction of sensor range).
    pub min: f32,
    /// Upper window bound (fraction of sensor range).
    pub max: f32,
    /// Brightness offset.
    pub brightness: f32,
    /// Layer opacity.
    pub opacity: f32,
    /// Additive blending flag.
    pub additive: bool,
}

/// Ordered layer stack with plane indices and camera state for one open
/// experiment view. Owns its layers; removing the viewport drops them and
/// their visuals.
pub struct Viewport {
    events: Rc<EventBus>,
    layers: Vec<Layer>,
    current_tpoint: u32,
    current_zplane: u32,
    /// Camera state, updated by pan/zoom interactions.
    pub map_state: MapState,
}

impl Viewport {
    /// Create an empty viewport at (tpoint 0, zplane 0).
    pub fn new(events: Rc<EventBus>) -> Self {
        Self {
            events,
            layers: Vec::new(),
            current_tpoint: 0,
            current_zplane: 0,
            map_state: MapState::default(),
        }
    }

    /// Current time point index.
    pub fn current_tpoint(&self) -> u32 {
        self.current_tpoint
    }

    /// Current z-plane index.
    pub fn current_zplane(&self) -> u32 {
        self.current_zplane
    }

    /// Append a layer, assigning the next free z-index.
    ///
    /// Fails with [`LayerError::DuplicateLayer`] when a layer with the
    /// same id exists, and when a channel layer for the same
    /// (channel, tpoint, zplane) triple is already stacked (two such
    /// layers could never be distinguished by the visibility rule).
    pub fn add_layer(&mut self, layer: Layer) -> Result<(), LayerError> {
        let z_index = self
            .layers
            .iter()
            .map(|l| l.z_index)
            .max()
            .map_or(0, |max| max + 1);
        self.add_layer_at(layer, z_index)
    }

    /// Append a layer at an explicit z-index. Layers at or above the
    /// requested position shift up by one so the order stays total.
    pub fn add_layer_at(&mut self, mut layer: Layer, z_index: i32) -> Result<(), LayerError> {
        if self.layers.iter().any(|l| l.id == layer.id) {
            return Err(LayerError::DuplicateLayer { id: layer.id });
        }
        if let Some(channel) = layer.as_channel() {
            let occupied = self.layers.iter().filter_map(Layer::as_channel).any(|c| {
                c.channel == channel.channel
                    && c.tpoint == channel.tpoint
                    && c.zplane == channel.zplane
            });
            if occupied {
                return Err(LayerError::DuplicateLayer { id: layer.id });
            }
        }

        if self.layers.iter().any(|l| l.z_index == z_index) {
            for existing in &mut self.layers {
                if existing.z_index >= z_index {
                    existing.z_index += 1;
                }
            }
        }
        layer.z_index = z_index;

        let layer_id = layer.id.clone();
        self.layers.push(layer);
        log::debug!("Added layer '{layer_id}' at z {z_index}");
        self.events
            .publish(&ViewerEvent::LayerAdded { layer_id });
        Ok(())
    }

    /// Detach and destroy a layer and all its visuals. Removing an absent
    /// layer is a logged no-op.
    pub fn remove_layer(&mut self, id: &str) -> Option<Layer> {
        let position = self.layers.iter().position(|l| l.id == id);
        match position {
            Some(index) => {
                let layer = self.layers.remove(index);
                log::debug!("Removed layer '{id}'");
                self.events.publish(&ViewerEvent::LayerRemoved {
                    layer_id: layer.id.clone(),
                });
                Some(layer)
            }
            None => {
                log::warn!("remove_layer: layer '{id}' not found");
                None
            }
        }
    }

    /// Move a layer to a new z position, shifting conflicting layers up
    /// so the z-order stays total.
    pub fn move_layer(&mut self, id: &str, z_index: i32) -> Result<(), LayerError> {
        if !self.layers.iter().any(|l| l.id == id) {
            return Err(LayerError::UnknownLayer { id: id.to_string() });
        }
        if self.layers.iter().any(|l| l.id != id && l.z_index == z_index) {
            for layer in &mut self.layers {
                if layer.id != id && layer.z_index >= z_index {
                    layer.z_index += 1;
                }
            }
        }
        if let Some(layer) = self.layers.iter_mut().find(|l| l.id == id) {
            layer.z_index = z_index;
        }
        Ok(())
    }

    /// Look up a layer by id.
    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Look up a layer by id, mutably.
    pub fn layer_mut(&mut self, id: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    /// All layers in paint order (ascending z, back-to-front).
    pub fn layers_ordered(&self) -> Vec<&Layer> {
        let mut ordered: Vec<&Layer> = self.layers.iter().collect();
        ordered.sort_by_key(|l| l.z_index);
        ordered
    }

    /// Number of layers in the stack.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Switch the current (tpoint, zplane).
    ///
    /// Only re-selects which channel layers are effectively visible;
    /// non-matching layers stay in the stack untouched, so switching
    /// back is O(1).
    pub fn set_plane(&mut self, tpoint: u32, zplane: u32) {
        self.current_tpoint = tpoint;
        self.current_zplane = zplane;
    }

    /// Whether a layer contributes to the composite right now: visible,
    /// non-zero opacity and, for channel layers, matching the current
    /// plane indices.
    pub fn effectively_visible(&self, layer: &Layer) -> bool {
        if !layer.contributes() {
            return false;
        }
        match layer.as_channel() {
            Some(channel) => {
                channel.tpoint == self.current_tpoint && channel.zplane == self.current_zplane
            }
            None => true,
        }
    }

    /// Layers contributing to the composite, in paint order.
    pub fn visible_layers(&self) -> Vec<&Layer> {
        self.layers_ordered()
            .into_iter()
            .filter(|layer| self.effectively_visible(layer))
            .collect()
    }

    /// Paint parameter records for the visible channel layers, in paint
    /// order. This is what the engine feeds to the tile renderer.
    pub fn channel_paints(&self) -> Vec<ChannelPaint> {
        self.visible_layers()
            .into_iter()
            .filter_map(|layer| {
                let channel = layer.as_channel()?;
                Some(ChannelPaint {
                    layer_id: layer.id.clone(),
                    channel: channel.channel.clone(),
                    tint: channel.tint,
                    min: channel.min(),
                    max: channel.max(),
                    brightness: channel.brightness(),
                    opacity: layer.opacity(),
                    additive: channel.additive,
                })
            })
            .collect()
    }

    /// Compose one pixel from raw intensities keyed by channel name.
    ///
    /// Mirrors the renderer's blend: visible channel layers contribute
    /// `tint × transform(raw) × opacity` in z order, additively where the
    /// layer's flag says so, replacing the accumulated color otherwise.
    /// Channels without a sample contribute nothing.
    pub fn compose(&self, raw_intensities: &HashMap<String, f32>) -> [f32; 3] {
        let mut acc = [0.0f32; 3];
        for layer in self.visible_layers() {
            let Some(channel) = layer.as_channel() else {
                continue;
            };
            let Some(raw) = raw_intensities.get(&channel.channel) else {
                continue;
            };
            let contribution = channel.contribution(*raw, layer.opacity());
            if channel.additive {
                for (a, c) in acc.iter_mut().zip(contribution) {
                    *a += c;
                }
            } else {
                acc = contribution;
            }
        }
        acc.map(|c| c.clamp(0.0, 1.0))
    }

    /// Object ids known for one object type, gathered from the
    /// segmentation layers in the stack. Tool responses referencing ids
    /// outside this registry are skipped.
    pub fn known_object_ids(&self, object_type: &str) -> HashSet<ObjectId> {
        self.layers
            .iter()
            .filter_map(Layer::as_segmentation)
            .filter(|s| s.object_type == object_type)
            .flat_map(|s| s.object_ids())
            .collect()
    }

    /// The segmentation layer for one object type, if present.
    pub fn segmentation_layer(&self, object_type: &str) -> Option<&crate::model::SegmentationLayer> {
        self.layers
            .iter()
            .filter_map(Layer::as_segmentation)
            .find(|s| s.object_type == object_type)
    }

    /// Channel layers in the stack, regardless of visibility.
    pub fn channel_layers(&self) -> impl Iterator<Item = (&Layer, &ChannelLayer)> {
        self.layers.iter().filter_map(|layer| match &layer.kind {
            LayerKind::Channel(channel) => Some((layer, channel)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::model::SegmentationLayer;

    fn test_viewport() -> Viewport {
        Viewport::new(Rc::new(EventBus::new()))
    }

    fn channel_layer(id: &str, channel: &str, tpoint: u32, zplane: u32) -> Layer {
        Layer::channel(id, ChannelLayer::new(channel, tpoint, zplane, 4095.0))
    }

    #[test]
    fn test_add_layer_assigns_increasing_z() {
        let mut viewport = test_viewport();
        viewport.add_layer(channel_layer("a", "dapi", 0, 0)).unwrap();
        viewport.add_layer(channel_layer("b", "gfp", 0, 0)).unwrap();
        assert_eq!(viewport.layer("a").unwrap().z_index, 0);
        assert_eq!(viewport.layer("b").unwrap().z_index, 1);
    }

    #[test]
    fn test_duplicate_layer_id_rejected() {
        let mut viewport = test_viewport();
        viewport.add_layer(channel_layer("a", "dapi", 0, 0)).unwrap();
        let err = viewport
            .add_layer(channel_layer("a", "gfp", 0, 0))
            .expect_err("duplicate id");
        assert!(matches!(err, LayerError::DuplicateLayer { .. }));
        assert_eq!(viewport.layer_count(), 1);
    }

    #[test]
    fn test_duplicate_channel_plane_rejected() {
        let mut viewport = test_viewport();
        viewport.add_layer(channel_layer("a", "dapi", 1, 2)).unwrap();
        let err = viewport
            .add_layer(channel_layer("b", "dapi", 1, 2))
            .expect_err("same channel/plane triple");
        assert!(matches!(err, LayerError::DuplicateLayer { .. }));
    }

    #[test]
    fn test_remove_absent_layer_is_noop() {
        let mut viewport = test_viewport();
        assert!(viewport.remove_layer("ghost").is_none());
    }

    #[test]
    fn test_plane_switch_preserves_layers() {
        let mut viewport = test_viewport();
        viewport.add_layer(channel_layer("t0", "dapi", 0, 0)).unwrap();
        viewport.add_layer(channel_layer("t1", "dapi", 1, 0)).unwrap();

        assert_eq!(viewport.visible_layers().len(), 1);
        assert_eq!(viewport.visible_layers()[0].id, "t0");

        viewport.set_plane(1, 0);
        assert_eq!(viewport.visible_layers()[0].id, "t1");
        assert_eq!(viewport.layer_count(), 2);

        viewport.set_plane(0, 0);
        assert_eq!(viewport.visible_layers()[0].id, "t0");
    }

    #[test]
    fn test_hidden_or_transparent_layers_do_not_contribute() {
        let mut viewport = test_viewport();
        let mut layer = channel_layer("a", "dapi", 0, 0);
        layer.as_channel_mut().unwrap().tint = Color::rgb(255, 255, 255);
        viewport.add_layer(layer).unwrap();

        let samples = HashMap::from([("dapi".to_string(), 4095.0f32)]);
        assert_eq!(viewport.compose(&samples), [1.0, 1.0, 1.0]);

        viewport.layer_mut("a").unwrap().visible = false;
        assert_eq!(viewport.compose(&samples), [0.0, 0.0, 0.0]);

        viewport.layer_mut("a").unwrap().visible = true;
        viewport.layer_mut("a").unwrap().set_opacity(0.0);
        assert_eq!(viewport.compose(&samples), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_additive_blend_clamps() {
        let mut viewport = test_viewport();
        let mut red = channel_layer("r", "red", 0, 0);
        red.as_channel_mut().unwrap().tint = Color::rgb(255, 0, 0);
        let mut magenta = channel_layer("m", "far-red", 0, 0);
        magenta.as_channel_mut().unwrap().tint = Color::rgb(255, 0, 255);
        viewport.add_layer(red).unwrap();
        viewport.add_layer(magenta).unwrap();

        let samples = HashMap::from([
            ("red".to_string(), 4095.0f32),
            ("far-red".to_string(), 4095.0f32),
        ]);
        // Red saturates: 1.0 + 1.0 clamped.
        assert_eq!(viewport.compose(&samples), [1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_channel_paints_in_z_order() {
        let mut viewport = test_viewport();
        viewport.add_layer(channel_layer("a", "dapi", 0, 0)).unwrap();
        viewport.add_layer(channel_layer("b", "gfp", 0, 0)).unwrap();
        viewport.move_layer("a", 5).unwrap();

        let paints = viewport.channel_paints();
        assert_eq!(paints.len(), 2);
        assert_eq!(paints[0].channel, "gfp");
        assert_eq!(paints[1].channel, "dapi");
    }

    #[test]
    fn test_move_layer_keeps_order_total() {
        let mut viewport = test_viewport();
        viewport.add_layer(channel_layer("a", "dapi", 0, 0)).unwrap();
        viewport.add_layer(channel_layer("b", "gfp", 0, 0)).unwrap();
        viewport.add_layer(channel_layer("c", "cy5", 0, 0)).unwrap();

        viewport.move_layer("a", 1).unwrap();
        let mut zs: Vec<i32> = viewport.layers_ordered().iter().map(|l| l.z_index).collect();
        let len_before_dedup = zs.len();
        zs.dedup();
        assert_eq!(zs.len(), len_before_dedup, "z indices must stay unique");
    }

    #[test]
    fn test_known_object_ids_from_segmentation_layers() {
        let mut viewport = test_viewport();
        let mut segmentation =
            SegmentationLayer::new("cells", Color::rgb(0, 0, 255), Color::rgb(255, 255, 255));
        segmentation.insert_visual(1, crate::model::Visual::point(0.0, 0.0));
        segmentation.insert_visual(2, crate::model::Visual::point(1.0, 1.0));
        viewport
            .add_layer(Layer::segmentation("cells", segmentation))
            .unwrap();

        let known = viewport.known_object_ids("cells");
        assert!(known.contains(&1) && known.contains(&2));
        assert!(viewport.known_object_ids("nuclei").is_empty());
    }
}
