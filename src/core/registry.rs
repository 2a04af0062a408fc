//! Authoritative in-memory topology: classes → groups → users
//!
//! The class map sits behind a reader-writer lock and every class behind
//! its own mutex, so two classes never contend and no caller can observe a
//! half-applied change to one class. Nothing in here performs I/O or awaits.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::core::message_types::{GroupSummary, MemberInfo};
use crate::error::{ClassroomError, Result};
use crate::storage::ToolbarRecord;

/// Accumulated position of a student inside a group
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    /// Movement vectors add up; they never overwrite
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }
}

/// Ephemeral per-student state
#[derive(Debug, Clone, PartialEq)]
pub struct UserState {
    pub position: Position,
    /// Latest client-reported status, opaque to the server
    pub info: Value,
}

impl UserState {
    pub fn new() -> Self {
        Self {
            position: Position::ORIGIN,
            info: json!({}),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for UserState {
    fn default() -> Self {
        Self::new()
    }
}

/// A subdivision of a class
#[derive(Debug, Clone)]
pub struct Group {
    pub id: u32,
    /// Usernames in join order
    pub members: Vec<String>,
    pub xml: Value,
    pub toolbar: Value,
}

impl Group {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            members: Vec::new(),
            xml: Value::Null,
            toolbar: Value::Null,
        }
    }

    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m == username)
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// A live classroom session
#[derive(Debug, Clone)]
pub struct Class {
    pub handle: String,
    pub internal_id: u64,
    pub name: String,
    pub groups: BTreeMap<u32, Group>,
    pub users: HashMap<String, UserState>,
    pub settings: Value,
    /// Toolbars as last read from the store
    pub toolbars: Vec<ToolbarRecord>,
}

impl Class {
    /// A fresh class with groups `1..=group_count`
    pub fn new(handle: String, internal_id: u64, name: String, group_count: u32) -> Self {
        Self {
            handle,
            internal_id,
            name,
            groups: (1..=group_count).map(|id| (id, Group::new(id))).collect(),
            users: HashMap::new(),
            settings: json!({}),
            toolbars: Vec::new(),
        }
    }

    fn unknown_group(&self, group_id: u32) -> ClassroomError {
        ClassroomError::UnknownGroup(group_id.to_string())
    }

    pub fn group(&self, group_id: u32) -> Result<&Group> {
        self.groups
            .get(&group_id)
            .ok_or_else(|| self.unknown_group(group_id))
    }

    fn user_mut(&mut self, username: &str) -> Result<&mut UserState> {
        self.users
            .get_mut(username)
            .ok_or_else(|| ClassroomError::UnknownUser(username.to_string()))
    }

    pub fn group_ids(&self) -> Vec<u32> {
        self.groups.keys().copied().collect()
    }

    pub fn add_user(&mut self, username: &str) -> Result<()> {
        if self.users.contains_key(username) {
            return Err(ClassroomError::NameTaken(username.to_string()));
        }
        self.users.insert(username.to_string(), UserState::new());
        Ok(())
    }

    pub fn remove_user(&mut self, username: &str) -> Result<UserState> {
        self.users
            .remove(username)
            .ok_or_else(|| ClassroomError::UnknownUser(username.to_string()))
    }

    /// Append a class member to a group, resetting their state
    pub fn add_member(&mut self, group_id: u32, username: &str) -> Result<usize> {
        if !self.groups.contains_key(&group_id) {
            return Err(self.unknown_group(group_id));
        }
        self.user_mut(username)?.reset();

        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| ClassroomError::UnknownGroup(group_id.to_string()))?;
        group.members.push(username.to_string());
        Ok(group.size())
    }

    /// Remove a member from a group, resetting their state
    pub fn remove_member(&mut self, group_id: u32, username: &str) -> Result<usize> {
        let group = self.group(group_id)?;
        let index = group
            .members
            .iter()
            .position(|m| m == username)
            .ok_or_else(|| ClassroomError::NotMember(username.to_string()))?;

        if let Some(user) = self.users.get_mut(username) {
            user.reset();
        }
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| ClassroomError::UnknownGroup(group_id.to_string()))?;
        group.members.remove(index);
        Ok(group.size())
    }

    /// Apply a movement vector and replace the info blob of a group member
    pub fn update_member(
        &mut self,
        group_id: u32,
        username: &str,
        delta: (f64, f64),
        info: Value,
    ) -> Result<Position> {
        if !self.group(group_id)?.has_member(username) {
            return Err(ClassroomError::NotMember(username.to_string()));
        }

        let user = self.user_mut(username)?;
        user.position.translate(delta.0, delta.1);
        user.info = info;
        Ok(user.position)
    }

    pub fn add_group(&mut self, group_id: u32) {
        self.groups
            .entry(group_id)
            .or_insert_with(|| Group::new(group_id));
    }

    pub fn remove_group(&mut self, group_id: u32) -> Result<Group> {
        self.groups
            .remove(&group_id)
            .ok_or_else(|| ClassroomError::UnknownGroup(group_id.to_string()))
    }

    /// Member counts of every group, for lobby displays
    pub fn group_summaries(&self) -> Vec<GroupSummary> {
        self.groups
            .values()
            .map(|g| GroupSummary {
                grp_name: g.id,
                num: g.size(),
            })
            .collect()
    }

    /// Snapshot of one member of a group
    pub fn member_info(&self, group_id: u32, username: &str) -> MemberInfo {
        let state = self.users.get(username).cloned().unwrap_or_default();
        MemberInfo {
            member_name: username.to_string(),
            member_info: state.info,
            position: state.position,
            group_id,
        }
    }

    /// Snapshot of every member of a group in join order
    pub fn member_infos(&self, group_id: u32) -> Result<Vec<MemberInfo>> {
        let group = self.group(group_id)?;
        Ok(group
            .members
            .iter()
            .map(|m| self.member_info(group_id, m))
            .collect())
    }

    /// Store the shared diagram of a group
    pub fn set_xml(&mut self, group_id: u32, xml: Value, toolbar: Value) -> Result<()> {
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| ClassroomError::UnknownGroup(group_id.to_string()))?;
        group.xml = xml;
        group.toolbar = toolbar;
        Ok(())
    }
}

/// Registry of every live class, keyed by handle
pub struct Registry {
    classes: RwLock<HashMap<String, Arc<Mutex<Class>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert_class(&self, class: Class) -> Result<()> {
        let mut classes = self.classes.write()?;
        classes.insert(class.handle.clone(), Arc::new(Mutex::new(class)));
        Ok(())
    }

    /// Remove a class, returning its final state
    pub fn remove_class(&self, handle: &str) -> Result<Class> {
        let entry = self
            .classes
            .write()?
            .remove(handle)
            .ok_or_else(|| ClassroomError::UnknownClass(handle.to_string()))?;
        let class = entry.lock()?.clone();
        Ok(class)
    }

    pub fn contains(&self, handle: &str) -> Result<bool> {
        Ok(self.classes.read()?.contains_key(handle))
    }

    pub fn class_count(&self) -> Result<usize> {
        Ok(self.classes.read()?.len())
    }

    /// Run `f` with exclusive access to one class. `f` must validate before
    /// it mutates so that a failure leaves the class untouched.
    pub fn with_class<R>(
        &self,
        handle: &str,
        f: impl FnOnce(&mut Class) -> Result<R>,
    ) -> Result<R> {
        let entry = self
            .classes
            .read()?
            .get(handle)
            .cloned()
            .ok_or_else(|| ClassroomError::UnknownClass(handle.to_string()))?;
        let mut class = entry.lock()?;
        f(&mut class)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedRegistry = Arc<Registry>;
