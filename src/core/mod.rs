//! Classroom coordination engine

pub mod connection;
pub mod identity;
pub mod lifecycle;
pub mod membership;
pub mod message_handler;
pub mod message_types;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod server;
pub mod session;

// Re-export main components for convenience
pub use connection::{Connection, ConnectionContext, MembershipState};
pub use identity::{IdentityResolver, SharedIdentity};
pub use lifecycle::teardown;
pub use membership::{GroupDeparture, MembershipCoordinator, Outcome};
pub use message_handler::handle_message;
pub use message_types::{ClientEvent, ServerEvent};
pub use registry::{Class, Group, Position, Registry, SharedRegistry, UserState};
pub use rooms::{RoomKey, RoomTable, SharedRooms};
pub use router::{route, Delivery, Plan, Subscription, Target};
pub use server::ServerManager;
pub use session::{create_session_manager, SessionManager, Sessions};
