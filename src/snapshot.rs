//! Persisted viewport/selection state.
//!
//! The snapshot is the serialization boundary of the engine: channel
//! layer options, camera state and the selection handler, with colors in
//! their plain `{r, g, b, a}` form and camelCase keys on the wire. It can
//! be saved to and loaded from a per-user default path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::Color;
use crate::model::{ChannelLayer, Layer, ObjectId};
use crate::viewer::Viewer;
use crate::viewport::MapState;

/// Errors raised while persisting or restoring viewer state.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// I/O error while reading or writing the state file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The state payload is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted parameters of one channel layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelLayerOptions {
    /// Layer id.
    pub layer_id: String,
    /// Channel name.
    pub channel: String,
    /// Time point of the layer.
    pub tpoint: u32,
    /// Z-plane of the layer.
    pub zplane: u32,
    /// Sensor range lower bound.
    pub min_intensity: f32,
    /// Sensor range upper bound.
    pub max_intensity: f32,
    /// Intensity window lower bound (fraction of sensor range).
    pub min: f32,
    /// Intensity window upper bound (fraction of sensor range).
    pub max: f32,
    /// Brightness offset.
    pub brightness: f32,
    /// Layer opacity.
    pub opacity: f32,
    /// Visibility flag.
    pub visible: bool,
    /// Additive blending flag.
    pub additive: bool,
    /// Tint color, plain `{r, g, b, a}`.
    pub tint: Color,
    /// Z position in the stack.
    pub z_index: i32,
}

/// Persisted state of one selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEntry {
    /// Selection id (unique per object type).
    pub id: u32,
    /// Object type the selection belongs to.
    pub object_type: String,
    /// Display name.
    pub name: String,
    /// Marker color, plain `{r, g, b, a}`.
    pub color: Color,
    /// Member object ids, sorted for stable output.
    pub member_ids: Vec<ObjectId>,
}

/// Persisted state of the selection handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionHandlerState {
    /// All selections across object types.
    pub selections: Vec<SelectionEntry>,
    /// Id of the active selection, if one was active.
    pub active_selection_id: Option<u32>,
}

/// The full persisted viewer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSnapshot {
    /// Channel layer parameters.
    pub channel_layer_options: Vec<ChannelLayerOptions>,
    /// Camera state.
    pub map_state: MapState,
    /// Selection handler state.
    pub selection_handler: SelectionHandlerState,
}

impl ViewerSnapshot {
    /// Capture the persistable state of a viewer.
    pub fn capture(viewer: &Viewer) -> Self {
        let channel_layer_options = viewer
            .viewport
            .channel_layers()
            .map(|(layer, channel)| ChannelLayerOptions {
                layer_id: layer.id.clone(),
                channel: channel.channel.clone(),
                tpoint: channel.tpoint,
                zplane: channel.zplane,
                min_intensity: channel.min_intensity,
                max_intensity: channel.max_intensity,
                min: channel.min(),
                max: channel.max(),
                brightness: channel.brightness(),
                opacity: layer.opacity(),
                visible: layer.visible,
                additive: channel.additive,
                tint: channel.tint,
                z_index: layer.z_index,
            })
            .collect();

        let mut selections: Vec<SelectionEntry> = viewer
            .selections
            .iter_all()
            .map(|(object_type, selection)| {
                let mut member_ids: Vec<ObjectId> =
                    selection.member_ids().iter().copied().collect();
                member_ids.sort_unstable();
                SelectionEntry {
                    id: selection.id,
                    object_type: object_type.to_string(),
                    name: selection.name.clone(),
                    color: selection.color,
                    member_ids,
                }
            })
            .collect();
        selections.sort_by(|a, b| (&a.object_type, a.id).cmp(&(&b.object_type, b.id)));

        Self {
            channel_layer_options,
            map_state: viewer.viewport.map_state,
            selection_handler: SelectionHandlerState {
                active_selection_id: viewer.selections.active_selection().map(|s| s.id),
                selections,
            },
        }
    }

    /// Apply this snapshot to a viewer.
    ///
    /// Channel layer options are written onto layers with matching ids
    /// and create missing channel layers; selections are rebuilt from
    /// scratch and the active pointer re-established under the
    /// exclusivity invariant.
    pub fn apply(&self, viewer: &mut Viewer) {
        viewer.viewport.map_state = self.map_state;

        for options in &self.channel_layer_options {
            if viewer.viewport.layer(&options.layer_id).is_none() {
                let channel = ChannelLayer::new(
                    options.channel.clone(),
                    options.tpoint,
                    options.zplane,
                    options.max_intensity,
                );
                let layer = Layer::channel(options.layer_id.clone(), channel);
                if let Err(e) = viewer.viewport.add_layer_at(layer, options.z_index) {
                    log::warn!("Skipping persisted layer '{}': {e}", options.layer_id);
                    continue;
                }
            }
            let Some(layer) = viewer.viewport.layer_mut(&options.layer_id) else {
                continue;
            };
            layer.visible = options.visible;
            layer.set_opacity(options.opacity);
            if let Some(channel) = layer.as_channel_mut() {
                channel.min_intensity = options.min_intensity;
                channel.max_intensity = options.max_intensity;
                channel.additive = options.additive;
                channel.tint = options.tint;
                channel.set_brightness(options.brightness);
                if let Err(e) = channel.set_range(options.min, options.max) {
                    log::warn!(
                        "Keeping default window for layer '{}': {e}",
                        options.layer_id
                    );
                }
            }
        }

        viewer.selections.clear_all();
        for entry in &self.selection_handler.selections {
            viewer.selections.restore_selection(
                &entry.object_type,
                entry.id,
                entry.name.clone(),
                entry.color,
                entry.member_ids.iter().copied(),
            );
        }
        if let Some(active_id) = self.selection_handler.active_selection_id {
            let object_type = self
                .selection_handler
                .selections
                .iter()
                .find(|entry| entry.id == active_id)
                .map(|entry| entry.object_type.clone());
            match object_type {
                Some(object_type) => {
                    viewer.selections.toggle_active_selection(&object_type, active_id);
                }
                None => {
                    log::warn!("Persisted active selection {active_id} not among selections");
                }
            }
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Default per-user state file path. Returns `None` when no config
    /// directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cytomap").join("viewer-state.json"))
    }

    /// Save to a state file, creating parent directories as needed.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved viewer state to {path:?}");
        Ok(())
    }

    /// Load from a state file.
    pub fn load_from_path(path: &Path) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Try to load from the default path. Returns `None` when the file
    /// is absent or unreadable (logged, not fatal).
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No viewer state file at {path:?}");
            return None;
        }
        match Self::load_from_path(&path) {
            Ok(snapshot) => {
                log::info!("Loaded viewer state from {path:?}");
                Some(snapshot)
            }
            Err(e) => {
                log::warn!("Failed to load viewer state from {path:?}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{Reply, ToolRequest, ToolTransport};
    use crate::viewer::Experiment;

    struct NullTransport;

    impl ToolTransport for NullTransport {
        fn dispatch(&self, _request: ToolRequest, _replies: std::sync::mpsc::Sender<Reply>) {}
    }

    fn test_viewer() -> Viewer {
        Viewer::new(
            Experiment {
                id: "exp-1".to_string(),
                name: "plate 42".to_string(),
            },
            Vec::new(),
            Box::new(NullTransport),
        )
    }

    fn populated_viewer() -> Viewer {
        let mut viewer = test_viewer();

        let mut dapi = ChannelLayer::new("dapi", 0, 0, 4095.0);
        dapi.set_range(0.1, 0.9).unwrap();
        dapi.set_brightness(0.2);
        dapi.tint = Color::rgb(0, 0, 255);
        viewer
            .viewport
            .add_layer(Layer::channel("dapi-0-0", dapi))
            .unwrap();

        viewer.viewport.map_state = MapState {
            zoom: 4.0,
            center: (100.0, -50.0),
            resolution: 0.25,
            rotation: 0.0,
        };

        let a = viewer.selections.add_new_selection("cells");
        viewer.selections.toggle_active_selection("cells", a);
        viewer.selections.extend_active_selection(&[5, 3, 8]);
        viewer.selections.add_new_selection("nuclei");
        viewer
    }

    #[test]
    fn test_snapshot_round_trip() {
        let viewer = populated_viewer();
        let snapshot = ViewerSnapshot::capture(&viewer);
        let json = snapshot.to_json().expect("serialize");
        let restored = ViewerSnapshot::from_json(&json).expect("deserialize");
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn test_snapshot_uses_camel_case_and_plain_colors() {
        let viewer = populated_viewer();
        let json = ViewerSnapshot::capture(&viewer).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.get("channelLayerOptions").is_some());
        assert!(value.get("mapState").is_some());
        assert!(value["selectionHandler"].get("activeSelectionId").is_some());

        let tint = &value["channelLayerOptions"][0]["tint"];
        assert_eq!(tint["r"], 0);
        assert_eq!(tint["b"], 255);
        assert_eq!(tint["a"], 1.0);
    }

    #[test]
    fn test_apply_restores_layers_and_selections() {
        let snapshot = ViewerSnapshot::capture(&populated_viewer());

        let mut fresh = test_viewer();
        snapshot.apply(&mut fresh);

        let layer = fresh.viewport.layer("dapi-0-0").expect("layer recreated");
        let channel = layer.as_channel().unwrap();
        assert_eq!(channel.min(), 0.1);
        assert_eq!(channel.max(), 0.9);
        assert_eq!(channel.tint, Color::rgb(0, 0, 255));
        assert_eq!(fresh.viewport.map_state.zoom, 4.0);

        let active = fresh.selections.active_selection().expect("active restored");
        assert_eq!(active.id, 1);
        assert_eq!(active.len(), 3);
        assert!(active.contains(3) && active.contains(5) && active.contains(8));
        assert_eq!(fresh.selections.selections_for_type("nuclei").len(), 1);
    }

    #[test]
    fn test_restored_selections_keep_exclusivity() {
        let snapshot = ViewerSnapshot::capture(&populated_viewer());
        let mut fresh = test_viewer();
        snapshot.apply(&mut fresh);

        let active_count = fresh
            .selections
            .iter_all()
            .filter(|(_, s)| s.active)
            .count();
        assert_eq!(active_count, 1);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state").join("viewer-state.json");

        let snapshot = ViewerSnapshot::capture(&populated_viewer());
        snapshot.save_to_path(&path).expect("save");

        let loaded = ViewerSnapshot::load_from_path(&path).expect("load");
        assert_eq!(snapshot, loaded);
    }

    #[test]
    fn test_new_selection_ids_continue_after_restore() {
        let snapshot = ViewerSnapshot::capture(&populated_viewer());
        let mut fresh = test_viewer();
        snapshot.apply(&mut fresh);

        let next = fresh.selections.add_new_selection("cells");
        assert_eq!(next, 2, "restored ids are not reused");
    }
}
