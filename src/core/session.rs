use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use warp::ws::Message as WsMessage;

use crate::core::connection::Connection;

// Manages live client connections and their outbound senders
pub struct SessionManager {
    connections: HashMap<String, Connection>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    // Register a new client connection
    pub fn register(&mut self, id: String, sender: mpsc::UnboundedSender<WsMessage>) {
        let connection = Connection::with_id(id.clone(), sender);
        self.connections.insert(id, connection);
    }

    // Remove a client connection
    pub fn unregister(&mut self, id: &str) -> Option<Connection> {
        self.connections.remove(id)
    }

    // Send raw text to one client
    pub fn send_to(&self, id: &str, text: &str) -> bool {
        self.connections
            .get(id)
            .map_or(false, |connection| connection.send_text(text))
    }

    // Send raw text to a set of clients, returning how many accepted it
    pub fn send_to_many<'a>(&self, ids: impl IntoIterator<Item = &'a String>, text: &str) -> usize {
        ids.into_iter()
            .filter(|id| self.send_to(id, text))
            .count()
    }

    // Send raw text to every connected client
    pub fn broadcast_all(&self, text: &str) -> usize {
        self.connections
            .values()
            .filter(|connection| connection.send_text(text))
            .count()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    // Get current clients count
    pub fn client_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// Thread-safe session manager wrapper
pub type Sessions = Arc<RwLock<SessionManager>>;

// Create a new thread-safe session manager
pub fn create_session_manager() -> Sessions {
    Arc::new(RwLock::new(SessionManager::new()))
}
