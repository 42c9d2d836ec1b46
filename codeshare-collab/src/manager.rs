//! Room registry: maps room ids to rooms.
//!
//! One manager per process, created at startup and handed to the socket
//! server and the HTTP endpoint. Rooms are never removed.

use std::collections::HashMap;
use std::sync::Arc;

use codeshare_exec::Executor;
use tokio::sync::RwLock;

use crate::review::Reviewer;
use crate::room::{Room, RoomConfig};

pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    executor: Arc<dyn Executor>,
    reviewer: Arc<dyn Reviewer>,
    config: RoomConfig,
}

impl RoomManager {
    /// Create a manager whose rooms share `executor` and `reviewer`.
    pub fn new(executor: Arc<dyn Executor>, reviewer: Arc<dyn Reviewer>, config: RoomConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            executor,
            reviewer,
            config,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    fn new_room(&self, id: &str) -> Arc<Room> {
        Arc::new(Room::new(
            id,
            self.executor.clone(),
            self.reviewer.clone(),
            self.config.clone(),
        ))
    }

    /// Create and register a room, replacing any room already under `id`.
    ///
    /// Connections attached to a replaced room stay with it; only new
    /// lookups see the fresh one.
    pub async fn create_room(&self, id: &str) -> Arc<Room> {
        let room = self.new_room(id);
        if self.rooms.write().await.insert(id.to_string(), room.clone()).is_some() {
            log::warn!("Room {id} replaced");
        } else {
            log::info!("Room {id} created");
        }
        room
    }

    pub async fn get_room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(id).cloned()
    }

    /// Look up a room, creating it on first use.
    pub async fn get_or_create(&self, id: &str) -> Arc<Room> {
        // Fast path: read lock
        if let Some(room) = self.get_room(id).await {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(id) {
            return room.clone();
        }

        let room = self.new_room(id);
        rooms.insert(id.to_string(), room.clone());
        log::info!("Room {id} created");
        room
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
