//! WebSocket connection state
//! A `Connection` is the outbound half kept by the session manager; a
//! `ConnectionContext` is the per-connection state owned by the read loop.

use log::warn;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::Message;

/// Outbound side of a live WebSocket connection
pub struct Connection {
    pub id: String,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: Instant,
}

impl Connection {
    pub fn with_id(id: String, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Send a text message through this connection
    pub fn send_text(&self, text: &str) -> bool {
        match self.sender.send(Message::text(text)) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to send message to client {}", self.id);
                false
            }
        }
    }

    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Where a connection stands in the class/group protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipState {
    Anonymous,
    InClass {
        username: String,
        class_handle: String,
    },
    InGroup {
        username: String,
        class_handle: String,
        group_id: u32,
    },
}

impl MembershipState {
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::InClass { username, .. } | Self::InGroup { username, .. } => Some(username),
        }
    }

    pub fn class_handle(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::InClass { class_handle, .. } | Self::InGroup { class_handle, .. } => {
                Some(class_handle)
            }
        }
    }

    pub fn group_id(&self) -> Option<u32> {
        match self {
            Self::InGroup { group_id, .. } => Some(*group_id),
            _ => None,
        }
    }

    /// True when bound to exactly this user of this class
    pub fn is_bound_to(&self, username: &str, class_handle: &str) -> bool {
        self.username() == Some(username) && self.class_handle() == Some(class_handle)
    }
}

/// Per-connection state, owned by the task that reads the socket
#[derive(Debug)]
pub struct ConnectionContext {
    pub id: String,
    pub state: MembershipState,
    /// Set once the console proves or opens an admin session
    pub admin_id: Option<u64>,
    torn_down: bool,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: String) -> Self {
        Self {
            id,
            state: MembershipState::Anonymous,
            admin_id: None,
            torn_down: false,
        }
    }

    /// Mark the connection as torn down. Returns false if it already was.
    pub fn begin_teardown(&mut self) -> bool {
        !std::mem::replace(&mut self.torn_down, true)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}
