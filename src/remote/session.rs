//! Tool session state and the request lifecycle.
//!
//! A session is one open interactive instance of a tool against a viewer.
//! It is created on the first open of the tool window and reused across
//! subsequent opens until explicitly discarded. `is_running` brackets
//! exactly the interval between the request-sent and request-done
//! notifications; overlapping requests on one session are rejected.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use uuid::Uuid;

use crate::remote::transport::TransportError;

/// Errors raised by session bookkeeping.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A request is already in flight on this session
    #[error("session {uuid} already has a request in flight")]
    Busy {
        /// The busy session
        uuid: Uuid,
    },

    /// The tool id is not in the catalog
    #[error("unknown tool: {id}")]
    UnknownTool {
        /// The missing tool id
        id: String,
    },

    /// No session has been opened for the tool
    #[error("no open session for tool: {id}")]
    UnknownSession {
        /// The tool id without a session
        id: String,
    },
}

/// One open interactive instance of a tool.
#[derive(Debug)]
pub struct ToolSession {
    /// Session identity, fresh per creation.
    pub uuid: Uuid,
    /// Id of the tool this session belongs to.
    pub tool_id: String,
    is_running: bool,
}

impl ToolSession {
    /// Allocate a session with a fresh uuid.
    pub fn new(tool_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            tool_id: tool_id.into(),
            is_running: false,
        }
    }

    /// Whether a request is currently in flight.
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.is_running = running;
    }
}

/// Shared slot resolved when a dispatched request settles.
///
/// The slot is settled by the engine while applying the reply, so reading
/// it after [`crate::Viewer::pump`] observes the settled value. Taking
/// the result consumes it.
#[derive(Clone, Default, Debug)]
pub struct PendingResponse {
    slot: Arc<Mutex<Option<Result<serde_json::Value, TransportError>>>>,
}

impl PendingResponse {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn settle(&self, result: Result<serde_json::Value, TransportError>) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            log::warn!("Response slot settled twice; keeping first result");
            return;
        }
        *slot = Some(result);
    }

    /// Whether the request has settled (successfully or not).
    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Take the settled result, leaving the slot empty. `None` while the
    /// request is still in flight.
    pub fn try_take(&self) -> Option<Result<serde_json::Value, TransportError>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sessions_get_distinct_uuids() {
        let a = ToolSession::new("classifier");
        let b = ToolSession::new("classifier");
        assert_ne!(a.uuid, b.uuid);
        assert!(!a.is_running());
    }

    #[test]
    fn test_pending_response_settles_once() {
        let pending = PendingResponse::new();
        assert!(!pending.is_settled());
        assert!(pending.try_take().is_none());

        pending.settle(Ok(serde_json::json!({"ok": true})));
        pending.settle(Err(TransportError::Unauthorized));

        let result = pending.try_take().expect("settled");
        assert!(result.is_ok(), "first settlement wins");
        assert!(pending.try_take().is_none(), "taking consumes the slot");
    }
}
