//! cytomap - layer/selection/tool-session engine for a microscopy viewer
//!
//! A stateful, event-driven core for an interactive viewer of large
//! multi-channel, multi-plane microscopy images. The engine composes
//! independently-parameterized image and vector layers into one view,
//! tracks named selections of segmentation objects used as analysis
//! input, and manages request/streaming sessions against a remote
//! analysis backend. Pixel painting itself is delegated to an external
//! tile renderer, parameterized by this crate.

pub mod color;
pub mod constants;
pub mod events;
pub mod model;
pub mod remote;
pub mod selection;
pub mod snapshot;
pub mod viewer;
pub mod viewport;

pub use color::Color;
pub use events::{EventBus, StreamStatus, SubscriptionId, ViewerEvent};
pub use model::{
    ChannelLayer, Layer, LayerError, LayerId, LayerKind, ManifestError, ObjectId, ResultLayer,
    SegmentationLayer, Tool, Visual, load_manifest, load_manifest_file,
};
pub use remote::{
    HttpTransport, JobBoard, JobStream, PendingResponse, SessionError, ToolResponse, ToolResult,
    ToolSession, ToolTransport, TransportError,
};
pub use selection::{MapObjectSelectionHandler, Selection};
pub use snapshot::{SnapshotError, ViewerSnapshot};
pub use viewer::{Experiment, Viewer};
pub use viewport::{ChannelPaint, MapState, Viewport};
