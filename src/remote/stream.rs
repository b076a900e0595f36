//! Persistent streaming channel for job output delivery.
//!
//! Unlike one-shot tool requests, job logs/status/figures arrive over a
//! persistent channel keyed by job id. A background worker owns the
//! connection and reconnects automatically at a fixed interval when it
//! drops; messages missed while disconnected are not replayed
//! (at-most-once delivery). Parsed messages and connection-state changes
//! are queued to the engine thread and drained by `Viewer::pump`.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Deserialize;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::constants::{STREAM_POLL_INTERVAL_MS, STREAM_RECONNECT_DELAY_MS};
use crate::events::StreamStatus;
use crate::remote::transport::TransportError;

/// A message from the backend, keyed by the job it concerns.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    /// A job produced an output payload (e.g. a figure).
    Output {
        /// Id of the producing job.
        #[serde(rename = "jobId")]
        job_id: u64,
        /// Tool-specific output payload.
        data: serde_json::Value,
    },
    /// A job changed state.
    Status {
        /// Id of the job.
        #[serde(rename = "jobId")]
        job_id: u64,
        /// New state (e.g. `"running"`, `"done"`, `"failed"`).
        state: String,
    },
    /// A job emitted a log line.
    Log {
        /// Id of the job.
        #[serde(rename = "jobId")]
        job_id: u64,
        /// The log line.
        line: String,
    },
}

impl StreamMessage {
    /// Id of the job this message concerns.
    pub fn job_id(&self) -> u64 {
        match self {
            StreamMessage::Output { job_id, .. }
            | StreamMessage::Status { job_id, .. }
            | StreamMessage::Log { job_id, .. } => *job_id,
        }
    }
}

/// Everything the channel delivers to the engine, in arrival order.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Connection status change.
    Status(StreamStatus),
    /// A parsed backend message.
    Message(StreamMessage),
}

/// Factory for stream connections; called again on every reconnect.
pub trait StreamConnector: Send + 'static {
    /// Establish a fresh connection.
    fn connect(&mut self) -> Result<Box<dyn StreamConnection>, TransportError>;
}

/// One live stream connection.
pub trait StreamConnection: Send {
    /// Send a text frame.
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Wait briefly for the next text frame. `Ok(None)` means no message
    /// arrived within the implementation's poll window; an error means
    /// the connection is gone.
    fn poll_message(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection.
    fn close(&mut self);
}

/// WebSocket connector for a backend stream endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Create a connector for the given `ws://`/`wss://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl StreamConnector for WsConnector {
    fn connect(&mut self) -> Result<Box<dyn StreamConnection>, TransportError> {
        let (socket, _response) = tungstenite::connect(self.url.as_str())
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        // Bound read() so the worker can interleave command handling.
        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            stream
                .set_read_timeout(Some(Duration::from_millis(STREAM_POLL_INTERVAL_MS)))
                .ok();
        }
        log::info!("Stream connected to {}", self.url);
        Ok(Box::new(WsConnection { socket }))
    }
}

struct WsConnection {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl StreamConnection for WsConnection {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.to_string()))
            .map_err(|e| TransportError::Connection(e.to_string()))
    }

    fn poll_message(&mut self) -> Result<Option<String>, TransportError> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(text)),
            // Control and binary frames carry no job messages.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Binary(_))
            | Ok(Message::Frame(_)) => Ok(None),
            Ok(Message::Close(_)) => Err(TransportError::Connection(
                "closed by server".to_string(),
            )),
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(TransportError::Connection(e.to_string())),
        }
    }

    fn close(&mut self) {
        let _ = self.socket.close(None);
    }
}

enum Command {
    Send(String),
    Close,
}

enum ServeOutcome {
    /// Connection dropped; reconnect.
    Dropped,
    /// Explicit close; do not reconnect.
    Closed,
}

/// Handle to the streaming job channel.
///
/// Dropping the handle closes the channel.
pub struct JobStream {
    commands: Sender<Command>,
    events: Receiver<StreamEvent>,
    worker: Option<JoinHandle<()>>,
}

impl JobStream {
    /// Open the channel against a WebSocket endpoint.
    pub fn connect(url: impl Into<String>) -> Self {
        Self::with_connector(
            WsConnector::new(url),
            Duration::from_millis(STREAM_RECONNECT_DELAY_MS),
        )
    }

    /// Open the channel with a custom connector and reconnect delay.
    pub fn with_connector(connector: impl StreamConnector, reconnect_delay: Duration) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();
        let worker = std::thread::spawn(move || {
            worker_loop(connector, commands_rx, events_tx, reconnect_delay);
        });
        Self {
            commands: commands_tx,
            events: events_rx,
            worker: Some(worker),
        }
    }

    /// Ask the backend to run jobs: emits
    /// `{"type": "run", "jobIds": [...], "jtproject": ...}`.
    pub fn run_jobs(
        &self,
        job_ids: &[u64],
        jtproject: &serde_json::Value,
    ) -> Result<(), TransportError> {
        let message = serde_json::json!({
            "type": "run",
            "jobIds": job_ids,
            "jtproject": jtproject,
        });
        self.commands
            .send(Command::Send(message.to_string()))
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Drain everything the channel has delivered since the last call,
    /// in arrival order.
    pub fn poll_events(&self) -> Vec<StreamEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Close the channel explicitly. Takes effect immediately; no further
    /// reconnection is attempted.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

impl Drop for JobStream {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Close);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    mut connector: impl StreamConnector,
    commands: Receiver<Command>,
    events: Sender<StreamEvent>,
    reconnect_delay: Duration,
) {
    loop {
        match connector.connect() {
            Ok(mut connection) => {
                if events
                    .send(StreamEvent::Status(StreamStatus::Connected))
                    .is_err()
                {
                    return;
                }
                match serve_connection(connection.as_mut(), &commands, &events) {
                    ServeOutcome::Closed => {
                        let _ = events.send(StreamEvent::Status(StreamStatus::Closed));
                        return;
                    }
                    ServeOutcome::Dropped => {}
                }
            }
            Err(e) => {
                log::warn!("Stream connect failed: {e}");
            }
        }

        if events
            .send(StreamEvent::Status(StreamStatus::Reconnecting))
            .is_err()
        {
            return;
        }

        // Fixed-interval retry, interruptible by an explicit close.
        match commands.recv_timeout(reconnect_delay) {
            Ok(Command::Close) | Err(RecvTimeoutError::Disconnected) => {
                let _ = events.send(StreamEvent::Status(StreamStatus::Closed));
                return;
            }
            Ok(Command::Send(_)) => {
                // No replay across reconnects: the message is dropped.
                log::warn!("Dropping outbound stream message while disconnected");
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn serve_connection(
    connection: &mut dyn StreamConnection,
    commands: &Receiver<Command>,
    events: &Sender<StreamEvent>,
) -> ServeOutcome {
    loop {
        loop {
            match commands.try_recv() {
                Ok(Command::Send(text)) => {
                    if let Err(e) = connection.send(&text) {
                        log::warn!("Stream send failed: {e}");
                        return ServeOutcome::Dropped;
                    }
                }
                Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                    connection.close();
                    return ServeOutcome::Closed;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match connection.poll_message() {
            Ok(Some(text)) => match serde_json::from_str::<StreamMessage>(&text) {
                Ok(message) => {
                    if events.send(StreamEvent::Message(message)).is_err() {
                        return ServeOutcome::Closed;
                    }
                }
                Err(e) => {
                    log::warn!("Ignoring malformed stream message: {e}");
                }
            },
            Ok(None) => {}
            Err(e) => {
                log::warn!("Stream connection lost: {e}");
                return ServeOutcome::Dropped;
            }
        }
    }
}

/// Engine-side aggregation of job progress from stream messages.
#[derive(Debug, Clone, Default)]
pub struct JobState {
    /// Latest reported state, if any.
    pub status: Option<String>,
    /// Log lines in arrival order.
    pub log: Vec<String>,
    /// Output payloads in arrival order.
    pub outputs: Vec<serde_json::Value>,
}

/// Per-job view over everything the stream has delivered.
#[derive(Debug, Default)]
pub struct JobBoard {
    jobs: HashMap<u64, JobState>,
}

impl JobBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one stream message; returns the updated job id.
    pub fn apply(&mut self, message: &StreamMessage) -> u64 {
        let job_id = message.job_id();
        let job = self.jobs.entry(job_id).or_default();
        match message {
            StreamMessage::Output { data, .. } => job.outputs.push(data.clone()),
            StreamMessage::Status { state, .. } => job.status = Some(state.clone()),
            StreamMessage::Log { line, .. } => job.log.push(line.clone()),
        }
        job_id
    }

    /// State of one job, if the stream has mentioned it.
    pub fn job(&self, job_id: u64) -> Option<&JobState> {
        self.jobs.get(&job_id)
    }

    /// Number of jobs the board knows about.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no job has been mentioned yet.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
