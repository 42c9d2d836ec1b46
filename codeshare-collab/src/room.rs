//! A collaborative room: one shared buffer, the connections editing it,
//! and the execution gate for `run_code`.
//!
//! ```text
//! conn A ──text_update──► apply to TextBuffer ──input_update──► conns ≠ A
//! conn B ──run_code─────► exec gate ─► Executor ─output_update─► all conns
//! conn C (attach) ◄──connection_update (snapshot)
//! ```
//!
//! Lock order is buffer before connections. Edits are applied and echoed
//! under the buffer lock, so every client sees edits in the order the
//! buffer applied them.

use std::sync::Arc;
use std::time::Duration;

use codeshare_exec::Executor;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::broadcast::{BroadcastReport, ConnectionSet};
use crate::buffer::{BufferError, TextBuffer};
use crate::connection::Connection;
use crate::protocol::{
    ApiRequest, ClientMessage, ControlEvent, ControlResponse, EditOperation, OutboundUpdate,
    ProtocolError, UpdateEvent,
};
use crate::review::Reviewer;

/// Acknowledgment returned for accepted control requests.
pub const CONTROL_ACK: &str = "Data processed successfully";

/// Per-room settings.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Pause before a new connection gets its snapshot, so the client can
    /// finish wiring its handlers.
    pub snapshot_delay: Duration,
    /// Base file name handed to the executor.
    pub exec_base_name: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            snapshot_delay: Duration::from_millis(500),
            exec_base_name: "main-".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Running,
}

/// Why an inbound edit was dropped.
#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Bounds(#[from] BufferError),
}

pub struct Room {
    id: String,
    buffer: Mutex<TextBuffer>,
    connections: ConnectionSet,
    /// Held for the duration of a run; queues overlapping `run_code`s.
    exec_gate: Mutex<()>,
    executor: Arc<dyn Executor>,
    reviewer: Arc<dyn Reviewer>,
    config: RoomConfig,
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        executor: Arc<dyn Executor>,
        reviewer: Arc<dyn Reviewer>,
        config: RoomConfig,
    ) -> Self {
        Self {
            id: id.into(),
            buffer: Mutex::new(TextBuffer::new()),
            connections: ConnectionSet::new(),
            exec_gate: Mutex::new(()),
            executor,
            reviewer,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    /// Current buffer content.
    pub async fn snapshot(&self) -> String {
        self.buffer.lock().await.snapshot()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.len().await
    }

    pub fn execution_state(&self) -> ExecutionState {
        match self.exec_gate.try_lock() {
            Ok(_) => ExecutionState::Idle,
            Err(_) => ExecutionState::Running,
        }
    }

    /// Fan `update` out to every connection except `exclude`.
    pub async fn broadcast(&self, exclude: Option<Uuid>, update: &OutboundUpdate) -> BroadcastReport {
        match encode(update) {
            Some(frame) => self.connections.broadcast(exclude, frame).await,
            None => BroadcastReport::default(),
        }
    }

    async fn send_to(&self, id: Uuid, update: &OutboundUpdate) {
        if let Some(frame) = encode(update) {
            let _ = self.connections.send_to(&id, frame).await;
        }
    }

    /// Parse a raw `text_update` message, apply it, and echo it to every
    /// other connection.
    pub async fn handle_edit(&self, from: Option<Uuid>, raw: &str) -> Result<BroadcastReport, EditError> {
        let op: EditOperation = serde_json::from_str(raw).map_err(ProtocolError::Malformed)?;
        self.apply_edit(from, &op, raw).await
    }

    async fn apply_edit(
        &self,
        from: Option<Uuid>,
        op: &EditOperation,
        raw: &str,
    ) -> Result<BroadcastReport, EditError> {
        let echo = OutboundUpdate::echo(UpdateEvent::InputUpdate, raw)?;
        let mut buffer = self.buffer.lock().await;
        buffer.apply(op)?;
        let report = self.broadcast(from, &echo).await;
        drop(buffer);
        Ok(report)
    }

    /// Dispatch one inbound socket message. Control requests run on their
    /// own task so a long execution never blocks this connection's edits.
    pub async fn handle_message(self: &Arc<Self>, from: Uuid, raw: &str) {
        let message = match ClientMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Room {}: dropping message from {from}: {e}", self.id);
                return;
            }
        };

        match message {
            ClientMessage::Edit(op) => {
                if let Err(e) = self.apply_edit(Some(from), &op, raw).await {
                    log::warn!("Room {}: rejected edit from {from}: {e}", self.id);
                }
            }
            ClientMessage::Control(request) => {
                let room = Arc::clone(self);
                tokio::spawn(async move {
                    let response = room.handle_control(&request).await;
                    room.reply(from, &request, &response).await;
                });
            }
        }
    }

    /// Route a control response back to the requesting socket. Run output
    /// already went to everyone; only a rejection needs a private reply.
    async fn reply(&self, to: Uuid, request: &ApiRequest, response: &ControlResponse) {
        let update = match request.event {
            ControlEvent::CodeReview => {
                OutboundUpdate::text(UpdateEvent::ReviewUpdate, response.body.text())
            }
            ControlEvent::RunCode if !response.is_ok() => {
                OutboundUpdate::text(UpdateEvent::OutputUpdate, response.body.text())
            }
            _ => return,
        };
        self.send_to(to, &update).await;
    }

    pub async fn handle_control(&self, request: &ApiRequest) -> ControlResponse {
        match request.event {
            ControlEvent::RunCode => self.run_code(request.language.as_deref()).await,
            ControlEvent::CodeSave => ControlResponse::message(CONTROL_ACK),
            ControlEvent::CodeReview => self.review().await,
        }
    }

    /// Run the buffer and broadcast the output to every connection.
    ///
    /// Runs are queued one at a time per room. Pipeline failures are
    /// broadcast like output; an unsupported language is answered to the
    /// requester only.
    pub async fn run_code(&self, language: Option<&str>) -> ControlResponse {
        let Some(language) = language else {
            return ControlResponse::bad_request("unsupported language: none given");
        };

        let _running = self.exec_gate.lock().await;
        let source = self.snapshot().await;
        let result = self
            .executor
            .run(&self.id, language, &self.config.exec_base_name, &source)
            .await;

        let output = match result {
            Ok(out) => out.output,
            Err(e) if e.is_rejection() => {
                log::warn!("Room {}: {e}", self.id);
                return ControlResponse::bad_request(e.to_string());
            }
            Err(e) => {
                log::warn!("Room {}: run failed: {e}", self.id);
                e.to_string()
            }
        };

        let update = OutboundUpdate::text(UpdateEvent::OutputUpdate, output);
        self.broadcast(None, &update).await;
        ControlResponse::message(CONTROL_ACK)
    }

    pub async fn review(&self) -> ControlResponse {
        let source = self.snapshot().await;
        match self.reviewer.review(&source).await {
            Ok(text) => ControlResponse::review(text),
            Err(e) => {
                log::error!("Room {}: review failed: {e}", self.id);
                ControlResponse::review_failed()
            }
        }
    }

    /// Drive one connection for its whole life: join, receive the
    /// snapshot, process inbound messages until the stream ends, leave.
    pub async fn attach<S>(self: &Arc<Self>, conn: Arc<Connection>, mut incoming: S)
    where
        S: Stream<Item = String> + Unpin,
    {
        let id = conn.id();
        self.connections.add(conn.clone()).await;
        log::info!("Connection {id} joined room {}", self.id);

        tokio::time::sleep(self.config.snapshot_delay).await;
        {
            let buffer = self.buffer.lock().await;
            let update = OutboundUpdate::text(UpdateEvent::ConnectionUpdate, buffer.snapshot());
            self.send_to(id, &update).await;
        }

        while let Some(raw) = incoming.next().await {
            self.handle_message(id, &raw).await;
            if conn.is_closed() {
                break;
            }
        }

        if let Some(conn) = self.connections.remove(&id).await {
            conn.close();
        }
        log::info!("Connection {id} left room {}", self.id);
    }
}

fn encode(update: &OutboundUpdate) -> Option<Arc<str>> {
    match update.encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            log::error!("{e}");
            None
        }
    }
}
