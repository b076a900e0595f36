//! One-shot request boundary to the remote analysis backend.
//!
//! The engine never blocks on the network: a transport dispatches the
//! request off-thread and delivers the settled reply into an mpsc queue
//! that the engine drains on its own thread. Once sent, a request cannot
//! be cancelled; its reply is still applied even if the originating tool
//! window has been closed.

use std::sync::mpsc;

use thiserror::Error;
use uuid::Uuid;

/// Errors crossing the remote boundary.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request never reached the backend or the connection dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected the request
    #[error("request failed with status {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Human-readable failure message
        message: String,
    },

    /// The session is expired or the caller is not authorized.
    /// Distinguished so the caller can redirect to re-authentication.
    #[error("unauthorized or expired session")]
    Unauthorized,

    /// The response body was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The streaming channel is closed and will not reconnect
    #[error("streaming channel closed")]
    ChannelClosed,
}

/// A request bound for a tool session's endpoint.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    /// Engine-assigned id correlating the reply.
    pub request_id: u64,
    /// Session the request belongs to.
    pub session: Uuid,
    /// Request body, already merged with session identity.
    pub payload: serde_json::Value,
}

/// A settled reply delivered back to the engine queue.
#[derive(Debug)]
pub struct Reply {
    /// Id of the originating request.
    pub request_id: u64,
    /// Session the request belonged to.
    pub session: Uuid,
    /// Parsed response body, or the transport failure.
    pub result: Result<serde_json::Value, TransportError>,
}

/// Boundary trait for dispatching one-shot tool requests.
///
/// Implementations must deliver exactly one [`Reply`] per dispatched
/// request to `replies`, from any thread; the engine applies replies in
/// arrival order on its own thread.
pub trait ToolTransport {
    /// Dispatch a request without blocking the caller.
    fn dispatch(&self, request: ToolRequest, replies: mpsc::Sender<Reply>);
}

/// HTTP transport posting to a per-session endpoint under a base URL.
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Create a transport for the given backend base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            agent: ureq::Agent::new(),
        }
    }

    fn session_url(&self, session: Uuid) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), session)
    }

    fn post(
        agent: &ureq::Agent,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        match agent.post(url).send_json(payload) {
            Ok(response) => response
                .into_json()
                .map_err(|e| TransportError::Connection(format!("invalid response body: {e}"))),
            Err(ureq::Error::Status(status, response)) if status == 401 || status == 403 => {
                log::warn!("Request to {url} rejected with status {status}");
                let _ = response.into_string();
                Err(TransportError::Unauthorized)
            }
            Err(ureq::Error::Status(status, response)) => {
                let message = response
                    .into_string()
                    .unwrap_or_else(|_| "request rejected".to_string());
                Err(TransportError::Http { status, message })
            }
            Err(other) => Err(TransportError::Connection(other.to_string())),
        }
    }
}

impl ToolTransport for HttpTransport {
    fn dispatch(&self, request: ToolRequest, replies: mpsc::Sender<Reply>) {
        let url = self.session_url(request.session);
        let agent = self.agent.clone();
        std::thread::spawn(move || {
            let result = Self::post(&agent, &url, &request.payload);
            if let Err(e) = &result {
                log::error!("Tool request {} failed: {e}", request.request_id);
            }
            let reply = Reply {
                request_id: request.request_id,
                session: request.session,
                result,
            };
            // The engine may already be gone during shutdown.
            if replies.send(reply).is_err() {
                log::debug!("Dropping reply for request {}: engine closed", request.request_id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_url_joins_without_double_slash() {
        let transport = HttpTransport::new("http://backend/api/tools/");
        let session = Uuid::new_v4();
        assert_eq!(
            transport.session_url(session),
            format!("http://backend/api/tools/{session}")
        );
    }
}
