//! One client's outbound channel.
//!
//! Each connection owns a bounded queue drained by a writer task
//! ([`pump`]). Room code never touches the socket directly, so a slow
//! client cannot stall a broadcast; a full queue counts as a write
//! failure and gets the connection dropped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// Frames queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(Arc<str>),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,
    #[error("send queue full")]
    QueueFull,
}

/// Handle to an attached client.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    peer: Option<SocketAddr>,
    tx: mpsc::Sender<Outbound>,
    closed: AtomicBool,
}

impl Connection {
    /// Create a connection with a queue of `capacity` frames. The receiver
    /// goes to [`pump`] (or a test).
    pub fn new(peer: Option<SocketAddr>, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: Uuid::new_v4(),
            peer,
            tx,
            closed: AtomicBool::new(false),
        };
        (conn, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Queue a text frame without waiting.
    pub fn send(&self, frame: Arc<str>) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.tx.try_send(Outbound::Text(frame)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    /// Mark closed and ask the writer to send a close frame. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.try_send(Outbound::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

/// Writer task: forward queued frames to `sink` until the queue closes,
/// a close is requested, or the sink errors.
pub async fn pump<S>(mut rx: mpsc::Receiver<Outbound>, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(frame) = rx.recv().await {
        match frame {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text.to_string().into())).await {
                    log::debug!("Writer stopped: {e}");
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    rx.close();
    let _ = sink.close().await;
}
