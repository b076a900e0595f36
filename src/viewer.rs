//! The viewer root: one experiment bound to a viewport, a selection
//! handler, and the tool catalog with its sessions and results.
//!
//! All engine state lives on one thread. Remote work settles through two
//! delivery queues (tool replies, stream events) that [`Viewer::pump`]
//! drains; mutations triggered by user actions take effect synchronously.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::events::{EventBus, ViewerEvent};
use crate::model::{Layer, Tool};
use crate::remote::{
    JobBoard, JobStream, PendingResponse, Reply, SessionError, StreamEvent, ToolRequest,
    ToolResponse, ToolResult, ToolSession, ToolTransport, build_result_layer,
};
use crate::selection::MapObjectSelectionHandler;
use crate::viewport::Viewport;

/// Descriptor of the experiment a viewer is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experiment {
    /// Backend id of the experiment.
    pub id: String,
    /// Display name.
    pub name: String,
}

struct PendingEntry {
    tool_id: String,
    object_type: String,
    slot: PendingResponse,
}

/// Root engine object for one open experiment view.
pub struct Viewer {
    experiment: Experiment,
    /// Layer stack, plane indices and camera of this view.
    pub viewport: Viewport,
    /// Selections of this view.
    pub selections: MapObjectSelectionHandler,
    events: Rc<EventBus>,
    tools: Vec<Tool>,
    sessions: HashMap<String, ToolSession>,
    results: Vec<ToolResult>,
    transport: Box<dyn ToolTransport>,
    replies_tx: Sender<Reply>,
    replies_rx: Receiver<Reply>,
    pending: HashMap<u64, PendingEntry>,
    stream: Option<JobStream>,
    jobs: JobBoard,
    next_request_id: u64,
    next_result_id: u64,
}

impl Viewer {
    /// Bind an experiment to a fresh viewport and selection handler.
    ///
    /// `tools` is the catalog loaded from the manifest; `transport`
    /// carries one-shot tool requests to the backend.
    pub fn new(experiment: Experiment, tools: Vec<Tool>, transport: Box<dyn ToolTransport>) -> Self {
        let events = Rc::new(EventBus::new());
        let (replies_tx, replies_rx) = mpsc::channel();
        Self {
            viewport: Viewport::new(Rc::clone(&events)),
            selections: MapObjectSelectionHandler::new(Rc::clone(&events), "cells"),
            experiment,
            events,
            tools,
            sessions: HashMap::new(),
            results: Vec::new(),
            transport,
            replies_tx,
            replies_rx,
            pending: HashMap::new(),
            stream: None,
            jobs: JobBoard::new(),
            next_request_id: 1,
            next_result_id: 1,
        }
    }

    /// The bound experiment.
    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// The event bus of this viewer.
    pub fn events(&self) -> Rc<EventBus> {
        Rc::clone(&self.events)
    }

    /// The tool catalog.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// One catalog entry by id.
    pub fn tool(&self, tool_id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id == tool_id)
    }

    /// Open a tool: returns its session, creating one with a fresh uuid
    /// on the first open and reusing it on later opens until discarded.
    pub fn open_tool(&mut self, tool_id: &str) -> Result<&ToolSession, SessionError> {
        if !self.tools.iter().any(|t| t.id == tool_id) {
            return Err(SessionError::UnknownTool {
                id: tool_id.to_string(),
            });
        }
        let session = self
            .sessions
            .entry(tool_id.to_string())
            .or_insert_with(|| {
                let session = ToolSession::new(tool_id);
                log::info!("Created session {} for tool '{tool_id}'", session.uuid);
                session
            });
        Ok(session)
    }

    /// The open session for a tool, if any.
    pub fn session(&self, tool_id: &str) -> Option<&ToolSession> {
        self.sessions.get(tool_id)
    }

    /// Discard a tool's session; the next open creates a fresh one.
    /// Results produced by the session stay attached.
    pub fn discard_session(&mut self, tool_id: &str) -> bool {
        self.sessions.remove(tool_id).is_some()
    }

    /// Send a tool request on the tool's open session.
    ///
    /// The payload is merged with the session identity and dispatched
    /// without blocking; the returned slot settles when [`Viewer::pump`]
    /// applies the reply. A second request while one is in flight is
    /// rejected with [`SessionError::Busy`].
    pub fn send_tool_request(
        &mut self,
        tool_id: &str,
        payload: serde_json::Value,
    ) -> Result<PendingResponse, SessionError> {
        let session = self
            .sessions
            .get_mut(tool_id)
            .ok_or_else(|| SessionError::UnknownSession {
                id: tool_id.to_string(),
            })?;
        if session.is_running() {
            return Err(SessionError::Busy { uuid: session.uuid });
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut body = match payload {
            serde_json::Value::Object(map) => map,
            other => {
                log::warn!("Tool request payload is not an object; wrapping it");
                let mut map = serde_json::Map::new();
                map.insert("payload".to_string(), other);
                map
            }
        };
        body.insert(
            "session_uuid".to_string(),
            serde_json::Value::String(session.uuid.to_string()),
        );
        body.insert(
            "experiment_id".to_string(),
            serde_json::Value::String(self.experiment.id.clone()),
        );
        let object_type = body
            .get("chosen_object_type")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.selections.active_object_type().to_string());

        session.set_running(true);
        let session_uuid = session.uuid;
        self.events.publish(&ViewerEvent::ToolRequestSent {
            session: session_uuid,
            request_id,
        });

        let slot = PendingResponse::new();
        self.pending.insert(
            request_id,
            PendingEntry {
                tool_id: tool_id.to_string(),
                object_type,
                slot: slot.clone(),
            },
        );
        self.transport.dispatch(
            ToolRequest {
                request_id,
                session: session_uuid,
                payload: serde_json::Value::Object(body),
            },
            self.replies_tx.clone(),
        );
        log::debug!("Dispatched request {request_id} on session {session_uuid}");
        Ok(slot)
    }

    /// Drain both delivery queues and apply everything that has arrived,
    /// in arrival order per queue. Returns the number of applied items.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;

        while let Ok(reply) = self.replies_rx.try_recv() {
            self.apply_reply(reply);
            applied += 1;
        }

        let stream_events = match &self.stream {
            Some(stream) => stream.poll_events(),
            None => Vec::new(),
        };
        for event in stream_events {
            match event {
                StreamEvent::Status(status) => {
                    self.events
                        .publish(&ViewerEvent::StreamStatusChanged { status });
                }
                StreamEvent::Message(message) => {
                    let job_id = self.jobs.apply(&message);
                    self.events.publish(&ViewerEvent::JobUpdated { job_id });
                }
            }
            applied += 1;
        }

        applied
    }

    fn apply_reply(&mut self, reply: Reply) {
        let Some(entry) = self.pending.remove(&reply.request_id) else {
            log::warn!("Reply for unknown request {}", reply.request_id);
            return;
        };

        if let Some(session) = self.sessions.get_mut(&entry.tool_id) {
            // A discarded-and-reopened session has a new uuid; only the
            // originating session leaves the running state.
            if session.uuid == reply.session {
                session.set_running(false);
            }
        }

        let success = reply.result.is_ok();
        if let Ok(value) = &reply.result {
            self.attach_result(&entry, reply.request_id, value);
        }
        self.events.publish(&ViewerEvent::ToolRequestDone {
            session: reply.session,
            request_id: reply.request_id,
            success,
        });
        entry.slot.settle(reply.result);
    }

    fn attach_result(&mut self, entry: &PendingEntry, request_id: u64, value: &serde_json::Value) {
        let response = match ToolResponse::parse(value) {
            Ok(response) => response,
            Err(e) => {
                log::error!("Unparseable tool response for request {request_id}: {e}");
                return;
            }
        };

        let result_id = self.next_result_id;
        self.next_result_id += 1;

        let mut layer_id = None;
        let mut legend = None;
        if !response.classes.is_empty() {
            let built = self
                .viewport
                .segmentation_layer(&entry.object_type)
                .map(|source| build_result_layer(&response.classes, source));
            match built {
                Some((result_layer, result_legend, _skipped)) => {
                    let id = format!("result-{result_id}");
                    match self.viewport.add_layer(Layer::result(id.clone(), result_layer)) {
                        Ok(()) => {
                            layer_id = Some(id);
                            legend = Some(result_legend);
                        }
                        Err(e) => log::error!("Could not attach result layer: {e}"),
                    }
                }
                None => {
                    log::warn!(
                        "No segmentation layer for object type '{}'; result {result_id} has no layer",
                        entry.object_type
                    );
                }
            }
        }

        let name = self
            .tool(&entry.tool_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| entry.tool_id.clone());
        self.results.push(ToolResult {
            id: result_id,
            name,
            submission_id: request_id,
            layer_id,
            legend,
            plots: response.plots,
            visible: true,
        });
        self.events
            .publish(&ViewerEvent::ResultAttached { result_id });
    }

    /// Results attached to this viewer, oldest first.
    pub fn results(&self) -> &[ToolResult] {
        &self.results
    }

    /// One result by id.
    pub fn result(&self, result_id: u64) -> Option<&ToolResult> {
        self.results.iter().find(|r| r.id == result_id)
    }

    /// Show or hide a result. The result is the single source of truth:
    /// its layer, legend and all plots toggle together.
    pub fn set_result_visible(&mut self, result_id: u64, visible: bool) -> bool {
        let Some(result) = self.results.iter_mut().find(|r| r.id == result_id) else {
            log::warn!("set_result_visible: result {result_id} not found");
            return false;
        };
        result.visible = visible;
        for plot in &mut result.plots {
            plot.visible = visible;
        }
        if let Some(layer_id) = result.layer_id.clone() {
            if let Some(layer) = self.viewport.layer_mut(&layer_id) {
                layer.visible = visible;
            }
        }
        true
    }

    /// Delete a result: detaches and destroys its layer, legend and
    /// plots. The originating session stays open.
    pub fn delete_result(&mut self, result_id: u64) -> bool {
        let Some(index) = self.results.iter().position(|r| r.id == result_id) else {
            log::warn!("delete_result: result {result_id} not found");
            return false;
        };
        let result = self.results.remove(index);
        if let Some(layer_id) = &result.layer_id {
            self.viewport.remove_layer(layer_id);
        }
        log::debug!("Deleted result {result_id}");
        true
    }

    /// Attach a streaming job channel; its events flow through
    /// [`Viewer::pump`].
    pub fn attach_stream(&mut self, stream: JobStream) {
        self.stream = Some(stream);
    }

    /// The attached streaming channel, if any.
    pub fn stream(&self) -> Option<&JobStream> {
        self.stream.as_ref()
    }

    /// Close and detach the streaming channel. Immediate; no further
    /// reconnection.
    pub fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
    }

    /// Per-job progress aggregated from the streaming channel.
    pub fn jobs(&self) -> &JobBoard {
        &self.jobs
    }

    /// Capture the persistable viewport/selection state.
    pub fn snapshot(&self) -> crate::snapshot::ViewerSnapshot {
        crate::snapshot::ViewerSnapshot::capture(self)
    }

    /// Restore previously persisted viewport/selection state.
    pub fn restore(&mut self, snapshot: &crate::snapshot::ViewerSnapshot) {
        snapshot.apply(self);
    }
}
