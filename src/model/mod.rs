//! Data models for the cytomap engine.

mod layer;
mod tool;
mod visual;

pub use layer::{
    ChannelLayer, Layer, LayerError, LayerId, LayerKind, ResultLayer, SegmentationLayer,
};
pub use tool::{
    DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH, ManifestError, Tool, load_manifest,
    load_manifest_file,
};
pub use visual::{Geometry, MIN_POLYGON_VERTICES, ObjectId, Visual};
