//! Best-effort fan-out to a room's connection set.
//!
//! Every attached client has its own bounded queue (see
//! [`crate::connection`]), so a broadcast is N non-blocking enqueues.
//! Connections whose enqueue fails are collected during the pass and
//! removed and closed afterwards; the rest still get the frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::connection::{Connection, ConnectionError};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub connections_evicted: u64,
    pub active_connections: usize,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Lock-free counters, read via [`ConnectionSet::stats`].
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    connections_evicted: AtomicU64,
}

/// The connections attached to one room.
#[derive(Default)]
pub struct ConnectionSet {
    connections: Mutex<HashMap<Uuid, Arc<Connection>>>,
    stats: AtomicBroadcastStats,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, conn: Arc<Connection>) {
        self.connections.lock().await.insert(conn.id(), conn);
    }

    pub async fn remove(&self, id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.connections.lock().await.contains_key(id)
    }

    /// Send `frame` to every connection except `exclude`.
    pub async fn broadcast(&self, exclude: Option<Uuid>, frame: Arc<str>) -> BroadcastReport {
        let mut connections = self.connections.lock().await;
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        for (id, conn) in connections.iter() {
            if Some(*id) == exclude {
                continue;
            }
            match conn.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    log::warn!("Dropping connection {id}: {e}");
                    failed.push(*id);
                }
            }
        }

        for id in &failed {
            if let Some(conn) = connections.remove(id) {
                conn.close();
            }
        }
        drop(connections);

        report.dropped = failed.len();
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .messages_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.stats
            .connections_evicted
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        report
    }

    /// Send `frame` to a single connection. On failure the connection is
    /// removed and closed, as in [`broadcast`](Self::broadcast).
    pub async fn send_to(&self, id: &Uuid, frame: Arc<str>) -> Result<(), ConnectionError> {
        let mut connections = self.connections.lock().await;
        let Some(conn) = connections.get(id) else {
            return Err(ConnectionError::Closed);
        };
        let result = conn.send(frame);
        if let Err(e) = result {
            log::warn!("Dropping connection {id}: {e}");
            if let Some(conn) = connections.remove(id) {
                conn.close();
            }
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            self.stats.connections_evicted.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            connections_evicted: self.stats.connections_evicted.load(Ordering::Relaxed),
            active_connections: self.len().await,
        }
    }
}
