//! Connection teardown
//!
//! A dropped connection is an implicit group leave followed by an implicit
//! logout. Each step fails independently; the subscription and session
//! entries are always removed last.

use log::{debug, info, warn};

use crate::core::connection::{ConnectionContext, MembershipState};
use crate::core::message_handler::log_event;
use crate::core::router::route;
use crate::core::server::ServerManager;

/// Release everything a connection holds. Runs at most once per connection.
pub async fn teardown(server: &ServerManager, context: &mut ConnectionContext) {
    if !context.begin_teardown() {
        debug!("Connection {} already torn down", context.id);
        return;
    }
    let id = context.id.clone();
    let coordinator = server.coordinator();

    if let Some(admin_id) = context.admin_id {
        if let Err(e) = coordinator.touch_session(admin_id).await {
            warn!("Could not refresh session of admin {}: {}", admin_id, e);
        }
    }

    let state = context.state.clone();
    if let (Some(username), Some(class_handle)) = (state.username(), state.class_handle()) {
        if let Some(group_id) = state.group_id() {
            match coordinator.leave_group(context, username, class_handle, group_id, true) {
                Ok(outcome) => {
                    log_event(
                        "group_leave",
                        &(username.to_string(), class_handle.to_string(), group_id.to_string()),
                    );
                    server.apply_plan(&id, route(&outcome)).await;
                }
                Err(e) => {
                    warn!("Disconnect of {}: group leave failed: {}", id, e);
                    // Do not retry the group leave from inside the logout
                    context.state = MembershipState::InClass {
                        username: username.to_string(),
                        class_handle: class_handle.to_string(),
                    };
                }
            }
        }

        match coordinator.leave_class(context, username, class_handle, true) {
            Ok(outcome) => {
                log_event(
                    "logout",
                    &(username.to_string(), class_handle.to_string(), String::new()),
                );
                server.apply_plan(&id, route(&outcome)).await;
            }
            Err(e) => warn!("Disconnect of {}: logout failed: {}", id, e),
        }
    }

    context.state = MembershipState::Anonymous;
    server.unregister_connection(&id).await;
    info!("Connection {} closed", id);
}
