//! # codeshare-collab — shared rooms for collaborative editing
//!
//! Clients attach to a room over WebSocket, edit its buffer, and see each
//! other's edits live. A room can hand its buffer to an
//! [`Executor`](codeshare_exec::Executor) and broadcast the output.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   /ws/<room>   ┌──────────────┐       ┌─────────────┐
//! │ client       │ ◄────────────► │ CollabServer │ ────► │ RoomManager │
//! └──────────────┘   JSON frames  └──────────────┘       └──────┬──────┘
//!                                                               │
//! ┌──────────────┐   POST /api                           ┌──────┴──────┐
//! │ control      │ ────────────────────────────────────► │ Room        │
//! │ client       │                                       │ TextBuffer  │
//! └──────────────┘                                       │ Connections │
//!                                                        │ exec gate   │
//!                                                        └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`buffer`] — byte buffer with position-addressed insert/delete
//! - [`protocol`] — JSON wire messages
//! - [`connection`] — per-client outbound queue and writer task
//! - [`broadcast`] — best-effort fan-out over a room's connections
//! - [`room`] — edit handling, control requests, connection lifecycle
//! - [`manager`] — room registry
//! - [`review`] — code-review collaborator seam
//! - [`server`] — WebSocket server
//! - [`http`] — HTTP control endpoint

pub mod broadcast;
pub mod buffer;
pub mod connection;
pub mod http;
pub mod manager;
pub mod protocol;
pub mod review;
pub mod room;
pub mod server;

// Re-exports for convenience
pub use broadcast::{BroadcastReport, BroadcastStats, ConnectionSet};
pub use buffer::{BufferError, TextBuffer};
pub use connection::{Connection, ConnectionError, Outbound};
pub use http::{control_router, serve_control, HttpConfig};
pub use manager::RoomManager;
pub use protocol::{
    ApiRequest, ClientMessage, ControlBody, ControlEvent, ControlResponse, ControlStatus,
    EditOperation, OutboundUpdate, ProtocolError, UpdateEvent, UpdatePayload,
};
pub use review::{DisabledReviewer, ReviewError, Reviewer};
pub use room::{EditError, ExecutionState, Room, RoomConfig, CONTROL_ACK};
pub use server::{CollabServer, ServerConfig, ServerStats};
