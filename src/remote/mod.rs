//! Remote backend integration: one-shot tool requests, session
//! lifecycle, result ingestion and the streaming job channel.

mod result;
mod session;
mod stream;
mod transport;

pub use result::{
    ClassDescriptor, Legend, LegendEntry, Plot, ToolResponse, ToolResult, build_result_layer,
};
pub use session::{PendingResponse, SessionError, ToolSession};
pub use stream::{
    JobBoard, JobState, JobStream, StreamConnection, StreamConnector, StreamEvent, StreamMessage,
    WsConnector,
};
pub use transport::{HttpTransport, Reply, ToolRequest, ToolTransport, TransportError};
