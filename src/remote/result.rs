//! Tool responses and the renderable artifacts built from them.
//!
//! A completed tool interaction produces a [`ToolResult`]: at most one
//! result layer of per-class-colored visuals, an optional legend, and any
//! number of plots. The result object is the single source of truth for
//! whether those artifacts are shown; the layer's own visibility flag
//! only mirrors it.

use serde::Deserialize;

use crate::color::Color;
use crate::model::{LayerId, ObjectId, ResultLayer, SegmentationLayer};

/// One class of objects in a classification-shaped tool response.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassDescriptor {
    /// Class label shown in the legend.
    pub label: String,
    /// Class color; plain `{r, g, b}` with alpha defaulting to 1.
    pub color: Color,
    /// Ids of the objects assigned to this class.
    pub cell_ids: Vec<ObjectId>,
}

/// A plot artifact delivered with a tool response.
#[derive(Debug, Clone, Deserialize)]
pub struct Plot {
    /// Plot kind (e.g. `"scatter"`, `"histogram"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Tool-specific plot payload, handed to the plotting widget as-is.
    pub data: serde_json::Value,
    /// Whether the plot is currently shown; toggled with the result.
    #[serde(skip, default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

/// Parsed tool response body.
///
/// Classification tools fill `classes`; clustering/statistics tools use
/// their own shapes, which stay available in `extra` for the tool widget.
#[derive(Debug, Deserialize)]
pub struct ToolResponse {
    /// Per-class object assignments, if the tool produced any.
    #[serde(default)]
    pub classes: Vec<ClassDescriptor>,
    /// Plot artifacts, if the tool produced any.
    #[serde(default)]
    pub plots: Vec<Plot>,
    /// Tool-specific remainder of the payload.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ToolResponse {
    /// Parse a response body. Fails only on JSON that does not match the
    /// envelope shape.
    pub fn parse(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// One entry of a result legend.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    /// Class label.
    pub label: String,
    /// Class color.
    pub color: Color,
}

/// Legend describing the classes of a result layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Legend {
    /// Entries in response order.
    pub entries: Vec<LegendEntry>,
}

/// Build a result layer from class assignments, cloning each object's
/// geometry from the segmentation layer and coloring it by class.
///
/// Ids that do not resolve to an object in the segmentation layer are
/// skipped, not fatal. Returns the layer, its legend, and the number of
/// skipped ids.
pub fn build_result_layer(
    classes: &[ClassDescriptor],
    source: &SegmentationLayer,
) -> (ResultLayer, Legend, usize) {
    let mut layer = ResultLayer::new();
    let mut legend = Legend::default();
    let mut skipped = 0usize;

    for class in classes {
        legend.entries.push(LegendEntry {
            label: class.label.clone(),
            color: class.color,
        });
        for &id in &class.cell_ids {
            match source.visual(id) {
                Some(visual) => {
                    let colored = visual
                        .clone()
                        .with_fill_color(class.color)
                        .with_stroke_color(class.color);
                    layer.insert_visual(id, colored);
                }
                None => {
                    log::debug!(
                        "Skipping object {id} from class '{}': not in registry",
                        class.label
                    );
                    skipped += 1;
                }
            }
        }
    }

    if skipped > 0 {
        log::warn!("Result layer built with {skipped} unresolvable object ids skipped");
    }
    (layer, legend, skipped)
}

/// The renderable artifacts of one completed tool interaction.
#[derive(Debug)]
pub struct ToolResult {
    /// Viewer-assigned result id.
    pub id: u64,
    /// Display name, derived from the producing tool.
    pub name: String,
    /// Id of the request that produced this result.
    pub submission_id: u64,
    /// Id of the attached result layer, if the response produced one.
    pub layer_id: Option<LayerId>,
    /// Legend for the result layer, if any.
    pub legend: Option<Legend>,
    /// Plot artifacts.
    pub plots: Vec<Plot>,
    pub(crate) visible: bool,
}

impl ToolResult {
    /// Whether the result's artifacts are currently shown.
    pub fn visible(&self) -> bool {
        self.visible
    }
}
