//! Broadcast rooms: named sets of connections
//!
//! A room exists while it has subscribers. Membership here is transport
//! fan-out only; who belongs to which class or group is decided by the
//! registry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Address of a broadcast room
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// Every connection bound to a class
    Class(String),
    /// Every connection bound to one group of a class
    Group(String, u32),
    /// Instructor consoles watching a class
    Admin(String),
}

impl RoomKey {
    pub fn class(handle: &str) -> Self {
        Self::Class(handle.to_string())
    }

    pub fn group(handle: &str, group_id: u32) -> Self {
        Self::Group(handle.to_string(), group_id)
    }

    pub fn admin(handle: &str) -> Self {
        Self::Admin(handle.to_string())
    }

    /// Handle of the class this room belongs to
    pub fn class_handle(&self) -> &str {
        match self {
            Self::Class(h) | Self::Group(h, _) | Self::Admin(h) => h,
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(handle) => write!(f, "{}x", handle),
            Self::Group(handle, group_id) => write!(f, "{}x{}", handle, group_id),
            Self::Admin(handle) => write!(f, "admin-{}", handle),
        }
    }
}

/// Room subscriptions of every live connection
pub struct RoomTable {
    /// Room to subscribed connection ids
    rooms: Arc<RwLock<HashMap<RoomKey, HashSet<String>>>>,
    /// Connection id to the rooms it is subscribed to
    connection_rooms: Arc<RwLock<HashMap<String, HashSet<RoomKey>>>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            connection_rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe a connection to a room, creating the room on first use
    pub async fn join(&self, connection_id: &str, room: RoomKey) {
        // Both indexes change under one critical section
        let mut rooms = self.rooms.write().await;
        let mut connection_rooms = self.connection_rooms.write().await;

        rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id.to_string());
        connection_rooms
            .entry(connection_id.to_string())
            .or_default()
            .insert(room);
    }

    /// Unsubscribe a connection from a room. Empty rooms are dropped.
    pub async fn leave(&self, connection_id: &str, room: &RoomKey) {
        let mut rooms = self.rooms.write().await;
        let mut connection_rooms = self.connection_rooms.write().await;

        if let Some(members) = rooms.get_mut(room) {
            members.remove(connection_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
        if let Some(subscribed) = connection_rooms.get_mut(connection_id) {
            subscribed.remove(room);
            if subscribed.is_empty() {
                connection_rooms.remove(connection_id);
            }
        }
    }

    /// Drop every subscription of a connection
    pub async fn remove_connection(&self, connection_id: &str) {
        let mut rooms = self.rooms.write().await;
        let mut connection_rooms = self.connection_rooms.write().await;

        for room in connection_rooms.remove(connection_id).unwrap_or_default() {
            if let Some(members) = rooms.get_mut(&room) {
                members.remove(connection_id);
                if members.is_empty() {
                    rooms.remove(&room);
                }
            }
        }
    }

    /// Remove a room and unsubscribe everyone in it
    pub async fn dissolve(&self, room: &RoomKey) {
        let mut rooms = self.rooms.write().await;
        let mut connection_rooms = self.connection_rooms.write().await;

        for connection_id in rooms.remove(room).unwrap_or_default() {
            if let Some(subscribed) = connection_rooms.get_mut(&connection_id) {
                subscribed.remove(room);
                if subscribed.is_empty() {
                    connection_rooms.remove(&connection_id);
                }
            }
        }
    }

    /// Remove every room that belongs to a class
    pub async fn dissolve_class(&self, handle: &str) {
        let doomed: Vec<RoomKey> = self
            .rooms
            .read()
            .await
            .keys()
            .filter(|room| room.class_handle() == handle)
            .cloned()
            .collect();

        for room in doomed {
            self.dissolve(&room).await;
        }
    }

    /// Connection ids subscribed to a room
    pub async fn members(&self, room: &RoomKey) -> Vec<String> {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection is subscribed to
    pub async fn rooms_of(&self, connection_id: &str) -> Vec<RoomKey> {
        self.connection_rooms
            .read()
            .await
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_subscribed(&self, connection_id: &str, room: &RoomKey) -> bool {
        self.rooms
            .read()
            .await
            .get(room)
            .map_or(false, |members| members.contains(connection_id))
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomTable {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedRooms = Arc<RoomTable>;
