//! WebSocket server with path-based room routing.
//!
//! Architecture:
//! ```text
//! Client A ── ws://host/ws/one ──┐
//!                                ├── Room "one" ── TextBuffer
//! Client B ── ws://host/ws/one ──┘        │
//!                                         ├── ConnectionSet (fan-out)
//! Client C ── ws://host/ws/two ── Room "two"
//! ```
//!
//! Each accepted socket gets two tasks: a reader that feeds text frames
//! into [`Room::attach`](crate::room::Room::attach) and a writer that
//! drains the connection's queue into the socket.

use std::future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::connection::{self, Connection};
use crate::manager::RoomManager;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Upgrades must target `<prefix><room-id>`
    pub ws_path_prefix: String,
    /// Outbound frames buffered per connection before it counts as stalled
    pub send_queue_capacity: usize,
    /// Create rooms on first connection instead of refusing unknown ids
    pub auto_create_rooms: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            ws_path_prefix: "/ws/".to_string(),
            send_queue_capacity: 256,
            auto_create_rooms: true,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_handshakes: u64,
}

#[derive(Default)]
struct AtomicServerStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_handshakes: AtomicU64,
}

/// The socket server. Rooms live in the shared [`RoomManager`].
pub struct CollabServer {
    config: Arc<ServerConfig>,
    rooms: Arc<RoomManager>,
    stats: Arc<AtomicServerStats>,
}

impl CollabServer {
    pub fn new(config: ServerConfig, rooms: Arc<RoomManager>) -> Self {
        Self {
            config: Arc::new(config),
            rooms,
            stats: Arc::new(AtomicServerStats::default()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            active_connections: self.stats.active_connections.load(Ordering::Relaxed),
            rejected_handshakes: self.stats.rejected_handshakes.load(Ordering::Relaxed),
        }
    }

    /// Bind `bind_addr` and serve until the listener fails.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        log::info!("Collab server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let rooms = self.rooms.clone();
            let config = self.config.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, rooms, config, stats).await {
                    log::debug!("Connection from {addr} ended with error: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        rooms: Arc<RoomManager>,
        config: Arc<ServerConfig>,
        stats: Arc<AtomicServerStats>,
    ) -> Result<(), WsError> {
        let mut room_id: Option<String> = None;
        let callback = |request: &Request, response: Response| {
            let path = request.uri().path();
            match room_id_from_path(path, &config.ws_path_prefix) {
                Some(id) => {
                    room_id = Some(id.to_string());
                    Ok(response)
                }
                None => Err(not_found(path)),
            }
        };

        let mut ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                stats.rejected_handshakes.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        let Some(room_id) = room_id else {
            return Ok(());
        };

        let room = if config.auto_create_rooms {
            rooms.get_or_create(&room_id).await
        } else if let Some(room) = rooms.get_room(&room_id).await {
            room
        } else {
            log::info!("Refusing {addr}: no room {room_id}");
            stats.rejected_handshakes.fetch_add(1, Ordering::Relaxed);
            let frame = CloseFrame {
                code: CloseCode::Policy,
                reason: "unknown room".to_string().into(),
            };
            return ws_stream.close(Some(frame)).await;
        };

        log::info!("WebSocket connection established from {addr} to room {room_id}");
        stats.total_connections.fetch_add(1, Ordering::Relaxed);
        stats.active_connections.fetch_add(1, Ordering::Relaxed);

        let (sink, stream) = ws_stream.split();
        let (conn, rx) = Connection::new(Some(addr), config.send_queue_capacity);
        let writer = tokio::spawn(connection::pump(rx, sink));

        room.attach(Arc::new(conn), Box::pin(text_frames(stream))).await;

        let _ = writer.await;
        stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        log::info!("WebSocket connection from {addr} closed");
        Ok(())
    }
}

/// Extract the room id from an upgrade path such as `/ws/one`.
pub fn room_id_from_path<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let id = path.strip_prefix(prefix)?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id)
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("no room at {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// Text payloads of a socket, ending at the first close frame or read
/// error. Binary and control frames are skipped.
fn text_frames<S>(stream: S) -> impl Stream<Item = String>
where
    S: Stream<Item = Result<Message, WsError>>,
{
    stream
        .take_while(|frame| {
            future::ready(match frame {
                Ok(message) => !message.is_close(),
                Err(e) => {
                    log::debug!("Read failed: {e}");
                    false
                }
            })
        })
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text.to_string()),
                _ => None,
            })
        })
}
