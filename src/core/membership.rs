//! Membership coordination: the class/group protocol and admin operations
//!
//! Every operation validates against the connection's `MembershipState`,
//! mutates the registry under the class lock and reports what happened as an
//! `Outcome`. Deciding who hears about it is the router's job.
//!
//! Operations that await the store re-read the registry afterwards instead of
//! reusing anything read before the await.

use chrono::Utc;
use log::{debug, warn};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::constants::{ADMIN_USERNAME, MAX_GROUPS};
use crate::core::connection::{ConnectionContext, MembershipState};
use crate::core::identity::SharedIdentity;
use crate::core::message_types::{ClassListing, GroupSummary, MemberInfo};
use crate::core::registry::{Class, Position, SharedRegistry};
use crate::error::{ClassroomError, Result};
use crate::security::{hash_secret, verify_secret};
use crate::storage::{SharedStore, ToolbarRecord};

/// A student leaving a group, shared by explicit leaves, logouts and disconnects
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDeparture {
    pub username: String,
    pub class_handle: String,
    pub group_id: u32,
    pub group_size: usize,
    pub disconnect: bool,
    /// Members still in the group after the departure
    pub remaining: Vec<MemberInfo>,
}

/// What a successful operation changed or produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing to report to anyone
    Silent,
    LoggedIn {
        username: String,
        class_handle: String,
    },
    LoggedOut {
        username: String,
        class_handle: String,
        disconnect: bool,
        /// Implicit group leave performed first, if the user was in a group
        departure: Option<GroupDeparture>,
    },
    GroupsListed {
        username: String,
        class_handle: String,
        groups: Vec<GroupSummary>,
    },
    GroupJoined {
        username: String,
        class_handle: String,
        group_id: u32,
        group_size: usize,
        member: MemberInfo,
    },
    GroupLeft(GroupDeparture),
    GroupInfo {
        username: String,
        class_handle: String,
        group_id: u32,
        status: bool,
        members: Vec<MemberInfo>,
        requester: MemberInfo,
    },
    PositionUpdated {
        username: String,
        class_handle: String,
        group_id: u32,
        info: Value,
        position: Position,
        members: Vec<MemberInfo>,
    },
    XmlChanged {
        username: String,
        class_handle: String,
        group_id: u32,
        xml: Value,
        toolbar: Value,
    },
    XmlFetched {
        username: String,
        class_handle: String,
        group_id: u32,
        xml: Value,
        toolbar: Value,
    },
    SettingsFetched {
        class_handle: String,
        group_id: u32,
        settings: Value,
    },
    ClassCreated {
        class_handle: String,
        class_name: String,
        group_count: usize,
    },
    AdminJoined {
        class_handle: String,
        class_name: String,
        group_count: usize,
        /// Members of every non-empty group, read under one lock
        group_members: Vec<(u32, Vec<MemberInfo>)>,
    },
    AdminLeft {
        class_handle: String,
        disconnect: bool,
    },
    GroupAdded {
        class_handle: String,
        groups: Vec<GroupSummary>,
    },
    GroupDeleted {
        class_handle: String,
        group_id: u32,
        groups: Vec<GroupSummary>,
    },
    ClassDeleted {
        class_handle: String,
        group_ids: Vec<u32>,
        disconnect: bool,
    },
    SettingsSaved {
        class_handle: String,
        group_ids: Vec<u32>,
        settings: Value,
    },
    ClassesListed {
        classes: Vec<ClassListing>,
        disconnect: bool,
    },
    ToolbarsListed {
        class_handle: String,
        toolbars: Vec<ToolbarRecord>,
    },
    ToolbarDeleted {
        class_handle: String,
        toolbars: Vec<ToolbarRecord>,
    },
    AdminCreated {
        username: Option<String>,
        admin_id: Option<u64>,
        check: i8,
    },
    UsernameChecked {
        admin_id: Option<u64>,
        check: i8,
    },
    SessionChecked {
        admin_id: Option<u64>,
        check: i8,
    },
}

/// Movement vector from `{"x": dx, "y": dy}` or `[dx, dy]`; absent means no movement
pub fn parse_delta(delta: &Value) -> Result<(f64, f64)> {
    fn number(value: Option<&Value>) -> Option<f64> {
        let n = match value? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }?;
        n.is_finite().then_some(n)
    }

    let pair = match delta {
        Value::Null => return Ok((0.0, 0.0)),
        Value::Array(items) if items.len() == 2 => (number(items.first()), number(items.get(1))),
        Value::Object(map) => (number(map.get("x")), number(map.get("y"))),
        _ => (None, None),
    };

    match pair {
        (Some(dx), Some(dy)) => Ok((dx, dy)),
        _ => Err(ClassroomError::InvalidInput(
            "Movement must be a pair of numbers.".to_string(),
        )),
    }
}

/// Absent or empty info blobs are stored as `{}`
fn normalize_blob(value: Value) -> Value {
    match value {
        Value::Null => json!({}),
        Value::String(ref s) if s.is_empty() => json!({}),
        other => other,
    }
}

pub struct MembershipCoordinator {
    registry: SharedRegistry,
    identity: SharedIdentity,
    store: SharedStore,
    config: Arc<ServerConfig>,
}

impl MembershipCoordinator {
    pub fn new(
        registry: SharedRegistry,
        identity: SharedIdentity,
        store: SharedStore,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            registry,
            identity,
            store,
            config,
        }
    }

    fn authorize(&self, operation: &str, secret: &str) -> Result<()> {
        if self.config.admin_secret_matches(secret) {
            Ok(())
        } else {
            debug!("Skipping {}: admin secret mismatch", operation);
            Err(ClassroomError::Unauthorized)
        }
    }

    // ---- student protocol ----

    pub fn join_class(
        &self,
        context: &mut ConnectionContext,
        username: &str,
        class_handle: &str,
    ) -> Result<Outcome> {
        if username.is_empty() {
            return Err(ClassroomError::InvalidInput("Invalid username.".to_string()));
        }

        let taken = self
            .registry
            .with_class(class_handle, |class| Ok(class.users.contains_key(username)));
        if let Ok(true) = taken {
            return Err(ClassroomError::NameTaken(username.to_string()));
        }

        // A binding to a class that has since been deleted no longer counts
        if let Some(bound) = context.state.class_handle() {
            if self.registry.contains(bound)? {
                return Err(ClassroomError::InvalidInput(
                    "Connection is already logged into a class.".to_string(),
                ));
            }
            context.state = MembershipState::Anonymous;
        }

        self.registry
            .with_class(class_handle, |class| class.add_user(username))?;

        context.state = MembershipState::InClass {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
        };

        Ok(Outcome::LoggedIn {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
        })
    }

    pub fn leave_class(
        &self,
        context: &mut ConnectionContext,
        username: &str,
        class_handle: &str,
        disconnect: bool,
    ) -> Result<Outcome> {
        if !self.registry.contains(class_handle)? {
            return Err(ClassroomError::UnknownClass(class_handle.to_string()));
        }
        if !context.state.is_bound_to(username, class_handle) {
            return Err(ClassroomError::UnknownUser(username.to_string()));
        }

        let departure = match context.state.group_id() {
            Some(group_id) => {
                match self.leave_group(context, username, class_handle, group_id, disconnect) {
                    Ok(Outcome::GroupLeft(departure)) => Some(departure),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(
                            "Implicit group leave for {} in {} failed: {}",
                            username, class_handle, e
                        );
                        None
                    }
                }
            }
            None => None,
        };

        self.registry
            .with_class(class_handle, |class| class.remove_user(username))?;
        context.state = MembershipState::Anonymous;

        Ok(Outcome::LoggedOut {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            disconnect,
            departure,
        })
    }

    pub fn list_groups(&self, username: &str, class_handle: &str) -> Result<Outcome> {
        let groups = self
            .registry
            .with_class(class_handle, |class| Ok(class.group_summaries()))?;

        Ok(Outcome::GroupsListed {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            groups,
        })
    }

    pub fn join_group(
        &self,
        context: &mut ConnectionContext,
        username: &str,
        class_handle: &str,
        group_id: u32,
    ) -> Result<Outcome> {
        if !context.state.is_bound_to(username, class_handle) {
            return Err(ClassroomError::UnknownUser(username.to_string()));
        }
        if let Some(current) = context.state.group_id() {
            if !self.group_binding_is_stale(class_handle, current, username)? {
                return Err(ClassroomError::InvalidInput(
                    "Leave the current group before joining another.".to_string(),
                ));
            }
            debug!(
                "Dropping stale binding of {} to group {} of {}",
                username, current, class_handle
            );
            context.state = MembershipState::InClass {
                username: username.to_string(),
                class_handle: class_handle.to_string(),
            };
        }

        let (group_size, member) = self.registry.with_class(class_handle, |class| {
            let size = class.add_member(group_id, username)?;
            Ok((size, class.member_info(group_id, username)))
        })?;

        context.state = MembershipState::InGroup {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            group_id,
        };

        Ok(Outcome::GroupJoined {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            group_id,
            group_size,
            member,
        })
    }

    pub fn leave_group(
        &self,
        context: &mut ConnectionContext,
        username: &str,
        class_handle: &str,
        group_id: u32,
        disconnect: bool,
    ) -> Result<Outcome> {
        if !context.state.is_bound_to(username, class_handle)
            || context.state.group_id() != Some(group_id)
        {
            return Err(ClassroomError::NotMember(username.to_string()));
        }

        let result = self.registry.with_class(class_handle, |class| {
            let size = class.remove_member(group_id, username)?;
            Ok((size, class.member_infos(group_id)?))
        });

        let (group_size, remaining) = match result {
            Ok(done) => done,
            Err(e @ (ClassroomError::UnknownGroup(_) | ClassroomError::NotMember(_))) => {
                // The group was deleted, and maybe recreated, underneath this connection
                context.state = MembershipState::InClass {
                    username: username.to_string(),
                    class_handle: class_handle.to_string(),
                };
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        context.state = MembershipState::InClass {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
        };

        Ok(Outcome::GroupLeft(GroupDeparture {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            group_id,
            group_size,
            disconnect,
            remaining,
        }))
    }

    /// Whether the registry no longer lists `username` in `group_id`
    fn group_binding_is_stale(
        &self,
        class_handle: &str,
        group_id: u32,
        username: &str,
    ) -> Result<bool> {
        self.registry.with_class(class_handle, |class| {
            Ok(class
                .groups
                .get(&group_id)
                .map_or(true, |group| !group.has_member(username)))
        })
    }

    pub fn group_info(
        &self,
        username: &str,
        class_handle: &str,
        group_id: u32,
        status: bool,
    ) -> Result<Outcome> {
        let (members, requester) = self.registry.with_class(class_handle, |class| {
            Ok((
                class.member_infos(group_id)?,
                class.member_info(group_id, username),
            ))
        })?;

        Ok(Outcome::GroupInfo {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            group_id,
            status,
            members,
            requester,
        })
    }

    pub fn update_position(
        &self,
        context: &ConnectionContext,
        username: &str,
        class_handle: &str,
        group_id: u32,
        delta: &Value,
        info: Value,
    ) -> Result<Outcome> {
        if !context.state.is_bound_to(username, class_handle)
            || context.state.group_id() != Some(group_id)
        {
            return Err(ClassroomError::NotMember(username.to_string()));
        }
        let delta = parse_delta(delta)?;
        let info = normalize_blob(info);

        let (position, members) = self.registry.with_class(class_handle, |class| {
            let position = class.update_member(group_id, username, delta, info.clone())?;
            Ok((position, class.member_infos(group_id)?))
        })?;

        Ok(Outcome::PositionUpdated {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            group_id,
            info,
            position,
            members,
        })
    }

    fn check_diagram_access(class: &Class, username: &str) -> Result<()> {
        if username == ADMIN_USERNAME || class.users.contains_key(username) {
            Ok(())
        } else {
            Err(ClassroomError::UnknownUser(username.to_string()))
        }
    }

    pub fn change_xml(
        &self,
        username: &str,
        class_handle: &str,
        group_id: u32,
        xml: Value,
        toolbar: Value,
    ) -> Result<Outcome> {
        self.registry.with_class(class_handle, |class| {
            Self::check_diagram_access(class, username)?;
            class.set_xml(group_id, xml.clone(), toolbar.clone())
        })?;

        Ok(Outcome::XmlChanged {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            group_id,
            xml,
            toolbar,
        })
    }

    pub fn get_xml(&self, username: &str, class_handle: &str, group_id: u32) -> Result<Outcome> {
        let (xml, toolbar) = self.registry.with_class(class_handle, |class| {
            Self::check_diagram_access(class, username)?;
            let group = class.group(group_id)?;
            Ok((group.xml.clone(), group.toolbar.clone()))
        })?;

        Ok(Outcome::XmlFetched {
            username: username.to_string(),
            class_handle: class_handle.to_string(),
            group_id,
            xml,
            toolbar,
        })
    }

    pub fn get_settings(&self, class_handle: &str, group_id: u32) -> Result<Outcome> {
        let settings = self.registry.with_class(class_handle, |class| {
            class.group(group_id)?;
            Ok(class.settings.clone())
        })?;

        Ok(Outcome::SettingsFetched {
            class_handle: class_handle.to_string(),
            group_id,
            settings,
        })
    }

    // ---- admin operations, gated by the shared secret ----

    pub async fn create_class(
        &self,
        class_name: &str,
        group_count: u32,
        secret: &str,
        admin_id: Option<u64>,
    ) -> Result<Outcome> {
        self.authorize("add-class", secret)?;
        if class_name.trim().is_empty() {
            return Err(ClassroomError::InvalidInput("Invalid class name.".to_string()));
        }
        if group_count > MAX_GROUPS {
            return Err(ClassroomError::InvalidInput(format!(
                "A class can have at most {} groups.",
                MAX_GROUPS
            )));
        }

        // Store record first, then the handle, then the live class
        let internal_id = self
            .store
            .create_class(class_name, group_count, admin_id)
            .await?;
        let class_handle = self.identity.add(internal_id)?;
        let class = Class::new(
            class_handle.clone(),
            internal_id,
            class_name.to_string(),
            group_count,
        );
        let group_count = class.groups.len();
        self.registry.insert_class(class)?;

        Ok(Outcome::ClassCreated {
            class_handle,
            class_name: class_name.to_string(),
            group_count,
        })
    }

    pub fn join_class_admin(&self, class_handle: &str, secret: &str) -> Result<Outcome> {
        self.authorize("join-class", secret)?;
        self.identity.resolve(class_handle)?;

        let (class_name, group_count, group_members) =
            self.registry.with_class(class_handle, |class| {
                let mut group_members = Vec::new();
                for group in class.groups.values().filter(|g| g.size() > 0) {
                    group_members.push((group.id, class.member_infos(group.id)?));
                }
                Ok((class.name.clone(), class.groups.len(), group_members))
            })?;

        Ok(Outcome::AdminJoined {
            class_handle: class_handle.to_string(),
            class_name,
            group_count,
            group_members,
        })
    }

    pub fn leave_class_admin(
        &self,
        class_handle: &str,
        secret: &str,
        disconnect: bool,
    ) -> Result<Outcome> {
        self.authorize("leave-class", secret)?;
        self.identity.resolve(class_handle)?;

        Ok(Outcome::AdminLeft {
            class_handle: class_handle.to_string(),
            disconnect,
        })
    }

    pub async fn create_group(&self, class_handle: &str, secret: &str) -> Result<Outcome> {
        self.authorize("add-group", secret)?;
        let internal_id = self.identity.resolve(class_handle)?;

        let group_id = self.store.create_group(internal_id).await?;
        let groups = self.registry.with_class(class_handle, |class| {
            class.add_group(group_id);
            Ok(class.group_summaries())
        })?;

        Ok(Outcome::GroupAdded {
            class_handle: class_handle.to_string(),
            groups,
        })
    }

    pub async fn delete_group(
        &self,
        class_handle: &str,
        group_id: u32,
        secret: &str,
    ) -> Result<Outcome> {
        self.authorize("delete-group", secret)?;
        let internal_id = self.identity.resolve(class_handle)?;
        self.registry
            .with_class(class_handle, |class| class.group(group_id).map(|_| ()))?;

        self.store.delete_group(internal_id, group_id).await?;

        // Another console may have removed it while the store was busy
        let groups = self.registry.with_class(class_handle, |class| {
            if class.remove_group(group_id).is_err() {
                debug!("Group {} of {} was already gone", group_id, class_handle);
            }
            Ok(class.group_summaries())
        })?;

        Ok(Outcome::GroupDeleted {
            class_handle: class_handle.to_string(),
            group_id,
            groups,
        })
    }

    pub async fn delete_class(
        &self,
        class_handle: &str,
        secret: &str,
        disconnect: bool,
    ) -> Result<Outcome> {
        self.authorize("delete-class", secret)?;
        let internal_id = self.identity.resolve(class_handle)?;

        self.store.delete_class(internal_id).await?;

        let group_ids = match self.registry.remove_class(class_handle) {
            Ok(class) => class.group_ids(),
            Err(e) => {
                warn!("Class {} left the registry early: {}", class_handle, e);
                Vec::new()
            }
        };
        self.identity.remove(class_handle)?;

        Ok(Outcome::ClassDeleted {
            class_handle: class_handle.to_string(),
            group_ids,
            disconnect,
        })
    }

    pub fn save_settings(
        &self,
        class_handle: &str,
        settings: Value,
        secret: &str,
    ) -> Result<Outcome> {
        self.authorize("save-settings", secret)?;
        self.identity.resolve(class_handle)?;

        let settings = normalize_blob(settings);
        let group_ids = self.registry.with_class(class_handle, |class| {
            class.settings = settings.clone();
            Ok(class.group_ids())
        })?;

        Ok(Outcome::SettingsSaved {
            class_handle: class_handle.to_string(),
            group_ids,
            settings,
        })
    }

    pub async fn get_classes(
        &self,
        secret: &str,
        admin_id: Option<u64>,
        disconnect: bool,
    ) -> Result<Outcome> {
        self.authorize("get-classes", secret)?;

        let records = self.store.get_classes(admin_id).await?;
        let mut classes = Vec::with_capacity(records.len());
        for record in records {
            classes.push(ClassListing {
                class_id: self.identity.handle_of(record.class_id)?,
                class_name: record.class_name,
                admin_id: record.admin_id,
                created_at: record.created_at,
            });
        }

        Ok(Outcome::ClassesListed {
            classes,
            disconnect,
        })
    }

    /// Refresh the cached toolbar list of a class from the store
    async fn reload_toolbars(&self, class_handle: &str, internal_id: u64) -> Result<Vec<ToolbarRecord>> {
        let toolbars = self.store.get_toolbars(internal_id).await?;
        self.registry.with_class(class_handle, |class| {
            class.toolbars = toolbars.clone();
            Ok(())
        })?;
        Ok(toolbars)
    }

    pub async fn save_toolbar(
        &self,
        class_handle: &str,
        toolbar_name: &str,
        tools: Value,
        secret: &str,
    ) -> Result<Outcome> {
        self.authorize("save-toolbar", secret)?;
        let internal_id = self.identity.resolve(class_handle)?;

        let toolbar = ToolbarRecord {
            toolbar_name: toolbar_name.to_string(),
            tools,
        };
        self.store.create_toolbar(internal_id, toolbar).await?;
        let toolbars = self.reload_toolbars(class_handle, internal_id).await?;

        Ok(Outcome::ToolbarsListed {
            class_handle: class_handle.to_string(),
            toolbars,
        })
    }

    pub async fn get_toolbars(&self, class_handle: &str, secret: &str) -> Result<Outcome> {
        self.authorize("get-toolbars", secret)?;
        let internal_id = self.identity.resolve(class_handle)?;
        let toolbars = self.reload_toolbars(class_handle, internal_id).await?;

        Ok(Outcome::ToolbarsListed {
            class_handle: class_handle.to_string(),
            toolbars,
        })
    }

    pub async fn delete_toolbar(
        &self,
        class_handle: &str,
        toolbar_name: &str,
        secret: &str,
    ) -> Result<Outcome> {
        self.authorize("delete-toolbar", secret)?;
        let internal_id = self.identity.resolve(class_handle)?;

        self.store.delete_toolbar(internal_id, toolbar_name).await?;
        let toolbars = self.reload_toolbars(class_handle, internal_id).await?;

        Ok(Outcome::ToolbarDeleted {
            class_handle: class_handle.to_string(),
            toolbars,
        })
    }

    // ---- admin accounts and sessions ----

    pub async fn create_admin(&self, username: &str, password: &str, secret: &str) -> Result<Outcome> {
        self.authorize("create-admin", secret)?;
        if username.is_empty() || password.is_empty() {
            return Err(ClassroomError::InvalidInput(
                "Username and password are required.".to_string(),
            ));
        }

        if self.store.check_user(username).await?.is_some() {
            return Ok(Outcome::AdminCreated {
                username: None,
                admin_id: None,
                check: 0,
            });
        }

        let password_hash = hash_secret(password)?;
        let admin_id = self.store.create_user(username, &password_hash).await?;

        Ok(Outcome::AdminCreated {
            username: Some(username.to_string()),
            admin_id: Some(admin_id),
            check: 1,
        })
    }

    pub async fn check_username(
        &self,
        username: &str,
        password: &str,
        secret: &str,
    ) -> Result<Outcome> {
        self.authorize("check-username", secret)?;

        let outcome = match self.store.check_user(username).await? {
            None => Outcome::UsernameChecked {
                admin_id: None,
                check: 0,
            },
            Some(admin) if !verify_secret(password, &admin.password_hash) => {
                Outcome::UsernameChecked {
                    admin_id: Some(admin.admin_id),
                    check: -1,
                }
            }
            Some(admin) => Outcome::UsernameChecked {
                admin_id: Some(admin.admin_id),
                check: 1,
            },
        };
        Ok(outcome)
    }

    pub async fn create_session(
        &self,
        context: &mut ConnectionContext,
        admin_id: u64,
        token: &str,
    ) -> Result<Outcome> {
        let token_hash = hash_secret(token)?;
        self.store.create_session(admin_id, &token_hash).await?;
        context.admin_id = Some(admin_id);
        Ok(Outcome::Silent)
    }

    pub async fn check_session(
        &self,
        context: &mut ConnectionContext,
        admin_id: u64,
        token: &str,
    ) -> Result<Outcome> {
        let session = self.store.check_session(admin_id).await?;

        let verified = match &session {
            Some(record) if !token.is_empty() => verify_secret(token, &record.token_hash),
            _ => false,
        };
        if !verified {
            return Ok(Outcome::SessionChecked {
                admin_id: None,
                check: 0,
            });
        }

        context.admin_id = Some(admin_id);
        let expired = session.map_or(false, |record| {
            (Utc::now() - record.last_updated)
                .to_std()
                .map_or(false, |age| age >= self.config.session_ttl)
        });

        Ok(Outcome::SessionChecked {
            admin_id: Some(admin_id),
            check: if expired { -1 } else { 1 },
        })
    }

    pub async fn delete_session(&self, admin_id: u64) -> Result<Outcome> {
        self.store.delete_session(admin_id).await?;
        Ok(Outcome::Silent)
    }

    /// Record the end of an admin connection
    pub async fn touch_session(&self, admin_id: u64) -> Result<()> {
        self.store.update_time(admin_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::IdentityResolver;
    use crate::core::registry::Registry;
    use crate::storage::MemoryStore;

    const SECRET: &str = "test-admin-secret";

    fn coordinator() -> MembershipCoordinator {
        MembershipCoordinator::new(
            Arc::new(Registry::new()),
            Arc::new(IdentityResolver::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(ServerConfig::for_testing()),
        )
    }

    async fn class_handle(coordinator: &MembershipCoordinator, groups: u32) -> String {
        match coordinator
            .create_class("Physics", groups, SECRET, None)
            .await
            .unwrap()
        {
            Outcome::ClassCreated { class_handle, .. } => class_handle,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_parse_delta_forms() {
        assert_eq!(parse_delta(&Value::Null).unwrap(), (0.0, 0.0));
        assert_eq!(parse_delta(&json!({"x": 3, "y": -2})).unwrap(), (3.0, -2.0));
        assert_eq!(parse_delta(&json!([1.5, "2"])).unwrap(), (1.5, 2.0));
        assert!(matches!(
            parse_delta(&json!({"x": "left", "y": 1})),
            Err(ClassroomError::InvalidInput(_))
        ));
        assert!(parse_delta(&json!("north")).is_err());
        assert!(parse_delta(&json!([1])).is_err());
    }

    #[tokio::test]
    async fn test_empty_username_rejected_first() {
        let coordinator = coordinator();
        let mut context = ConnectionContext::new();
        assert!(matches!(
            coordinator.join_class(&mut context, "", "nonexistent"),
            Err(ClassroomError::InvalidInput(_))
        ));
        assert_eq!(context.state, MembershipState::Anonymous);
    }

    #[tokio::test]
    async fn test_state_machine_round_trip() {
        let coordinator = coordinator();
        let handle = class_handle(&coordinator, 2).await;
        let mut context = ConnectionContext::new();

        coordinator.join_class(&mut context, "alice", &handle).unwrap();
        assert!(matches!(
            coordinator.join_class(&mut context, "alice2", &handle),
            Err(ClassroomError::InvalidInput(_))
        ));

        coordinator.join_group(&mut context, "alice", &handle, 1).unwrap();
        assert!(matches!(
            coordinator.join_group(&mut context, "alice", &handle, 2),
            Err(ClassroomError::InvalidInput(_))
        ));
        assert!(matches!(
            coordinator.leave_group(&mut context, "alice", &handle, 2, false),
            Err(ClassroomError::NotMember(_))
        ));

        let outcome = coordinator.leave_class(&mut context, "alice", &handle, false).unwrap();
        match outcome {
            Outcome::LoggedOut { departure, .. } => {
                let departure = departure.expect("implicit group leave");
                assert_eq!(departure.group_id, 1);
                assert_eq!(departure.group_size, 0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(context.state, MembershipState::Anonymous);
    }

    #[tokio::test]
    async fn test_position_resets_after_leave() {
        let coordinator = coordinator();
        let handle = class_handle(&coordinator, 1).await;
        let mut context = ConnectionContext::new();
        coordinator.join_class(&mut context, "bob", &handle).unwrap();
        coordinator.join_group(&mut context, "bob", &handle, 1).unwrap();

        coordinator
            .update_position(&context, "bob", &handle, 1, &json!({"x": 3, "y": -2}), json!({"c": 1}))
            .unwrap();
        let outcome = coordinator
            .update_position(&context, "bob", &handle, 1, &json!([1, 1]), Value::Null)
            .unwrap();
        match outcome {
            Outcome::PositionUpdated { position, info, .. } => {
                assert_eq!(position, Position { x: 4.0, y: -1.0 });
                assert_eq!(info, json!({}));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        coordinator.leave_group(&mut context, "bob", &handle, 1, false).unwrap();
        coordinator.join_group(&mut context, "bob", &handle, 1).unwrap();
        let outcome = coordinator.group_info("bob", &handle, 1, true).unwrap();
        match outcome {
            Outcome::GroupInfo { requester, .. } => {
                assert_eq!(requester.position, Position::ORIGIN);
                assert_eq!(requester.member_info, json!({}));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_login_on_same_connection_is_name_taken() {
        let coordinator = coordinator();
        let handle = class_handle(&coordinator, 1).await;
        let mut context = ConnectionContext::new();

        coordinator.join_class(&mut context, "alice", &handle).unwrap();
        assert_eq!(
            coordinator.join_class(&mut context, "alice", &handle),
            Err(ClassroomError::NameTaken("alice".to_string()))
        );
        assert!(context.state.is_bound_to("alice", &handle));
    }

    #[tokio::test]
    async fn test_recreated_group_does_not_adopt_old_members() {
        let coordinator = coordinator();
        let handle = class_handle(&coordinator, 2).await;
        let mut context = ConnectionContext::new();
        coordinator.join_class(&mut context, "a", &handle).unwrap();
        coordinator.join_group(&mut context, "a", &handle, 2).unwrap();

        coordinator.delete_group(&handle, 2, SECRET).await.unwrap();
        match coordinator.create_group(&handle, SECRET).await.unwrap() {
            Outcome::GroupAdded { groups, .. } => {
                assert!(groups.iter().any(|g| g.grp_name == 2 && g.num == 0));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert!(matches!(
            coordinator.update_position(&context, "a", &handle, 2, &json!([1, 1]), Value::Null),
            Err(ClassroomError::NotMember(_))
        ));
        assert!(matches!(
            coordinator.leave_group(&mut context, "a", &handle, 2, false),
            Err(ClassroomError::NotMember(_))
        ));
        assert_eq!(context.state.group_id(), None);

        // A stale binding alone does not block joining elsewhere
        let mut other = ConnectionContext::new();
        coordinator.join_class(&mut other, "b", &handle).unwrap();
        coordinator.join_group(&mut other, "b", &handle, 2).unwrap();
        coordinator.delete_group(&handle, 2, SECRET).await.unwrap();
        coordinator.create_group(&handle, SECRET).await.unwrap();
        coordinator.join_group(&mut other, "b", &handle, 1).unwrap();
        assert_eq!(other.state.group_id(), Some(1));
    }

    #[tokio::test]
    async fn test_group_count_is_capped() {
        let coordinator = coordinator();
        let result = coordinator
            .create_class("Huge", 4_000_000_000, SECRET, None)
            .await;
        assert!(matches!(result, Err(ClassroomError::InvalidInput(_))));
        assert_eq!(coordinator.registry.class_count().unwrap(), 0);

        let handle = class_handle(&coordinator, MAX_GROUPS).await;
        let groups = coordinator
            .registry
            .with_class(&handle, |class| Ok(class.groups.len()))
            .unwrap();
        assert_eq!(groups, MAX_GROUPS as usize);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_unauthorized_and_changes_nothing() {
        let coordinator = coordinator();
        let result = coordinator.create_class("Physics", 2, "guess", None).await;
        assert_eq!(result, Err(ClassroomError::Unauthorized));
        assert_eq!(coordinator.registry.class_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_admin_ops_on_unknown_handle() {
        let coordinator = coordinator();
        assert!(matches!(
            coordinator.create_group("ab12cd34", SECRET).await,
            Err(ClassroomError::UnknownClass(_))
        ));
        assert!(matches!(
            coordinator.delete_class("ab12cd34", SECRET, false).await,
            Err(ClassroomError::UnknownClass(_))
        ));
        assert!(matches!(
            coordinator.join_class_admin("ab12cd34", SECRET),
            Err(ClassroomError::UnknownClass(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_session_checks() {
        let coordinator = coordinator();
        let mut context = ConnectionContext::new();

        let created = coordinator.create_admin("prof", "pw", SECRET).await.unwrap();
        let admin_id = match created {
            Outcome::AdminCreated { admin_id: Some(id), check: 1, .. } => id,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert!(matches!(
            coordinator.create_admin("prof", "pw", SECRET).await.unwrap(),
            Outcome::AdminCreated { check: 0, .. }
        ));
        assert!(matches!(
            coordinator.check_username("prof", "wrong", SECRET).await.unwrap(),
            Outcome::UsernameChecked { check: -1, .. }
        ));
        assert!(matches!(
            coordinator.check_username("nobody", "pw", SECRET).await.unwrap(),
            Outcome::UsernameChecked { check: 0, admin_id: None }
        ));

        coordinator.create_session(&mut context, admin_id, "token").await.unwrap();
        assert_eq!(context.admin_id, Some(admin_id));
        assert!(matches!(
            coordinator.check_session(&mut context, admin_id, "token").await.unwrap(),
            Outcome::SessionChecked { check: 1, .. }
        ));
        assert!(matches!(
            coordinator.check_session(&mut context, admin_id, "other").await.unwrap(),
            Outcome::SessionChecked { check: 0, .. }
        ));
    }
}
