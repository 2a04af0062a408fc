//! Inbound event handling: parse, coordinate, route, deliver

use log::{debug, info, warn};

use crate::core::connection::ConnectionContext;
use crate::core::membership::Outcome;
use crate::core::message_types::ClientEvent;
use crate::core::router::route;
use crate::core::server::ServerManager;
use crate::error::{ClassroomError, Result};

/// Handle one inbound text frame from a connection.
///
/// Failures are reported to that connection as `server_error`; a wrong
/// admin secret is dropped without a reply.
pub async fn handle_message(server: &ServerManager, context: &mut ConnectionContext, text: &str) {
    if text.len() > server.config().max_frame_bytes {
        warn!(
            "Dropping oversized frame from {} ({} bytes)",
            context.id,
            text.len()
        );
        server
            .send_error(&context.id, "Message too large.".to_string())
            .await;
        return;
    }

    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Invalid frame from {}: {}", context.id, e);
            server.send_error(&context.id, e.client_message()).await;
            return;
        }
    };

    let name = event.name();
    let subject = audit_subject(&event);
    let mutates = is_mutation(&event);

    match dispatch(server, context, event).await {
        Ok(outcome) => {
            if mutates && outcome != Outcome::Silent {
                log_event(name, &subject);
            }
            server.apply_plan(&context.id, route(&outcome)).await;
        }
        Err(ClassroomError::Unauthorized) => {
            debug!("Ignoring {} from {}: admin secret mismatch", name, context.id);
        }
        Err(e) => {
            warn!("{} from {} failed: {}", name, context.id, e);
            server.send_error(&context.id, e.client_message()).await;
        }
    }
}

/// One audit line per state change, `user~event~class~group`
pub(crate) fn log_event(event: &str, subject: &(String, String, String)) {
    let (user, class, group) = subject;
    info!("{}~{}~{}~{}", user, event, class, group);
}

fn audit_subject(event: &ClientEvent) -> (String, String, String) {
    use ClientEvent::*;

    let admin = "ADMIN".to_string();
    match event {
        Login { username, class_id }
        | Logout { username, class_id, .. }
        | GroupsGet { username, class_id } => (username.clone(), class_id.clone(), String::new()),
        GroupJoin { username, class_id, group_id }
        | GroupLeave { username, class_id, group_id, .. }
        | GroupInfo { username, class_id, group_id, .. }
        | CoordinateChange { username, class_id, group_id, .. }
        | XmlChange { username, class_id, group_id, .. }
        | GetXml { username, class_id, group_id } => {
            (username.clone(), class_id.clone(), group_id.to_string())
        }
        GetSettings { class_id, group_id } | DeleteGroup { class_id, group_id, .. } => {
            (admin, class_id.clone(), group_id.to_string())
        }
        AddClass { class_name, .. } => (admin, class_name.clone(), String::new()),
        JoinClass { class_id, .. }
        | LeaveClass { class_id, .. }
        | AddGroup { class_id, .. }
        | DeleteClass { class_id, .. }
        | SaveSettings { class_id, .. }
        | SaveToolbar { class_id, .. }
        | GetToolbars { class_id, .. }
        | DeleteToolbar { class_id, .. } => (admin, class_id.clone(), String::new()),
        CreateAdmin { username, .. } | CheckUsername { username, .. } => {
            (username.clone(), String::new(), String::new())
        }
        GetClasses { .. } => (admin, String::new(), String::new()),
        CreateSession { admin_id, .. }
        | CheckSession { admin_id, .. }
        | DeleteSession { admin_id } => (admin_id.to_string(), String::new(), String::new()),
    }
}

fn is_mutation(event: &ClientEvent) -> bool {
    !matches!(
        event,
        ClientEvent::GroupsGet { .. }
            | ClientEvent::GroupInfo { .. }
            | ClientEvent::GetXml { .. }
            | ClientEvent::GetSettings { .. }
            | ClientEvent::GetClasses { .. }
            | ClientEvent::GetToolbars { .. }
            | ClientEvent::CheckUsername { .. }
            | ClientEvent::CheckSession { .. }
    )
}

async fn dispatch(
    server: &ServerManager,
    context: &mut ConnectionContext,
    event: ClientEvent,
) -> Result<Outcome> {
    let coordinator = server.coordinator();

    match event {
        ClientEvent::Login { username, class_id } => {
            coordinator.join_class(context, &username, &class_id)
        }
        ClientEvent::Logout {
            username,
            class_id,
            disconnect,
        } => coordinator.leave_class(context, &username, &class_id, disconnect),
        ClientEvent::GroupsGet { username, class_id } => {
            coordinator.list_groups(&username, &class_id)
        }
        ClientEvent::GroupJoin {
            username,
            class_id,
            group_id,
        } => coordinator.join_group(context, &username, &class_id, group_id),
        ClientEvent::GroupLeave {
            username,
            class_id,
            group_id,
            disconnect,
        } => coordinator.leave_group(context, &username, &class_id, group_id, disconnect),
        ClientEvent::GroupInfo {
            username,
            class_id,
            group_id,
            status,
        } => coordinator.group_info(&username, &class_id, group_id, status),
        ClientEvent::CoordinateChange {
            username,
            class_id,
            group_id,
            info,
            delta,
        } => coordinator.update_position(context, &username, &class_id, group_id, &delta, info),
        ClientEvent::XmlChange {
            username,
            class_id,
            group_id,
            xml,
            toolbar,
        } => coordinator.change_xml(&username, &class_id, group_id, xml, toolbar),
        ClientEvent::GetXml {
            username,
            class_id,
            group_id,
        } => coordinator.get_xml(&username, &class_id, group_id),
        ClientEvent::GetSettings { class_id, group_id } => {
            coordinator.get_settings(&class_id, group_id)
        }

        ClientEvent::AddClass {
            class_name,
            group_count,
            secret,
            admin_id,
        } => {
            coordinator
                .create_class(&class_name, group_count, &secret, admin_id)
                .await
        }
        ClientEvent::JoinClass { class_id, secret } => {
            coordinator.join_class_admin(&class_id, &secret)
        }
        ClientEvent::LeaveClass {
            class_id,
            secret,
            disconnect,
        } => coordinator.leave_class_admin(&class_id, &secret, disconnect),
        ClientEvent::AddGroup { class_id, secret } => {
            coordinator.create_group(&class_id, &secret).await
        }
        ClientEvent::DeleteGroup {
            class_id,
            group_id,
            secret,
        } => coordinator.delete_group(&class_id, group_id, &secret).await,
        ClientEvent::DeleteClass {
            class_id,
            secret,
            disconnect,
        } => coordinator.delete_class(&class_id, &secret, disconnect).await,
        ClientEvent::SaveSettings {
            class_id,
            settings,
            secret,
        } => coordinator.save_settings(&class_id, settings, &secret),
        ClientEvent::GetClasses {
            secret,
            admin_id,
            disconnect,
        } => coordinator.get_classes(&secret, admin_id, disconnect).await,
        ClientEvent::SaveToolbar {
            class_id,
            toolbar_name,
            tools,
            secret,
        } => {
            coordinator
                .save_toolbar(&class_id, &toolbar_name, tools, &secret)
                .await
        }
        ClientEvent::GetToolbars { class_id, secret } => {
            coordinator.get_toolbars(&class_id, &secret).await
        }
        ClientEvent::DeleteToolbar {
            class_id,
            toolbar_name,
            secret,
        } => {
            coordinator
                .delete_toolbar(&class_id, &toolbar_name, &secret)
                .await
        }

        ClientEvent::CreateAdmin {
            username,
            password,
            secret,
        } => coordinator.create_admin(&username, &password, &secret).await,
        ClientEvent::CheckUsername {
            username,
            password,
            secret,
        } => coordinator.check_username(&username, &password, &secret).await,
        ClientEvent::CreateSession { admin_id, token } => {
            coordinator.create_session(context, admin_id, &token).await
        }
        ClientEvent::CheckSession { admin_id, token } => {
            coordinator.check_session(context, admin_id, &token).await
        }
        ClientEvent::DeleteSession { admin_id } => coordinator.delete_session(admin_id).await,
    }
}
