//! Integrated server service that coordinates sessions, rooms and classes

use log::{debug, error, trace, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::Message as WsMessage;

use crate::config::ServerConfig;
use crate::core::identity::{IdentityResolver, SharedIdentity};
use crate::core::membership::MembershipCoordinator;
use crate::core::message_types::ServerEvent;
use crate::core::registry::{Registry, SharedRegistry};
use crate::core::rooms::{RoomKey, RoomTable, SharedRooms};
use crate::core::router::{Plan, Subscription, Target};
use crate::core::session::{create_session_manager, Sessions};
use crate::error::Result;
use crate::storage::SharedStore;

/// Integrated server service shared by every connection task
pub struct ServerManager {
    config: Arc<ServerConfig>,
    registry: SharedRegistry,
    identity: SharedIdentity,
    rooms: SharedRooms,
    sessions: Sessions,
    coordinator: MembershipCoordinator,
}

impl ServerManager {
    pub fn new(config: ServerConfig, store: SharedStore) -> Self {
        let config = Arc::new(config);
        let registry: SharedRegistry = Arc::new(Registry::new());
        let identity: SharedIdentity = Arc::new(IdentityResolver::new());
        let coordinator = MembershipCoordinator::new(
            registry.clone(),
            identity.clone(),
            store,
            config.clone(),
        );

        Self {
            config,
            registry,
            identity,
            rooms: Arc::new(RoomTable::new()),
            sessions: create_session_manager(),
            coordinator,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &MembershipCoordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn identity(&self) -> &SharedIdentity {
        &self.identity
    }

    pub fn rooms(&self) -> &SharedRooms {
        &self.rooms
    }

    /// Register the outbound half of a new connection
    pub async fn register_connection(&self, id: String, sender: mpsc::UnboundedSender<WsMessage>) {
        self.sessions.write().await.register(id, sender);
    }

    /// Drop a connection from every room, then from the session table
    pub async fn unregister_connection(&self, id: &str) {
        self.rooms.remove_connection(id).await;
        if let Some(connection) = self.sessions.write().await.unregister(id) {
            debug!(
                "Connection {} unregistered after {:?}",
                id,
                connection.connection_duration()
            );
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.client_count()
    }

    /// Send one event to one connection
    pub async fn send_to_connection(&self, id: &str, event: &ServerEvent) -> Result<bool> {
        let text = event.to_json()?;
        Ok(self.sessions.read().await.send_to(id, &text))
    }

    /// Send raw text to every connection in a room
    pub async fn broadcast_to_room(
        &self,
        room: &RoomKey,
        message: &str,
        exclude: Option<&str>,
    ) -> usize {
        let members = self.rooms.members(room).await;
        let recipients: Vec<String> = members
            .into_iter()
            .filter(|id| Some(id.as_str()) != exclude)
            .collect();

        let sent = self.sessions.read().await.send_to_many(&recipients, message);
        trace!("Delivered to {}/{} members of {}", sent, recipients.len(), room);
        sent
    }

    /// Apply a routing plan on behalf of the connection `origin`.
    /// Returns the number of frames handed to connections.
    pub async fn apply_plan(&self, origin: &str, plan: Plan) -> usize {
        for change in plan.subscriptions {
            match change {
                Subscription::Join(room) => self.rooms.join(origin, room).await,
                Subscription::Leave(room) => self.rooms.leave(origin, &room).await,
            }
        }

        let mut delivered = 0;
        for delivery in plan.deliveries {
            let text = match delivery.event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize outbound event: {}", e);
                    continue;
                }
            };

            delivered += match &delivery.target {
                Target::Origin => {
                    usize::from(self.sessions.read().await.send_to(origin, &text))
                }
                Target::Room(room) => self.broadcast_to_room(room, &text, None).await,
                Target::RoomExceptOrigin(room) => {
                    self.broadcast_to_room(room, &text, Some(origin)).await
                }
                Target::Everyone => self.sessions.read().await.broadcast_all(&text),
            };
        }

        for room in plan.dissolve_rooms {
            self.rooms.dissolve(&room).await;
        }
        if let Some(handle) = plan.dissolve_class {
            self.rooms.dissolve_class(&handle).await;
        }

        delivered
    }

    /// Report a failure to the connection that caused it
    pub async fn send_error(&self, origin: &str, message: String) {
        match self
            .send_to_connection(origin, &ServerEvent::server_error(message))
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("Could not deliver server_error to {}", origin),
            Err(e) => error!("Failed to encode server_error: {}", e),
        }
    }
}
