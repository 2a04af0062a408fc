//! In-memory store implementation for development and testing
//!
//! Mirrors the relational schema (admins, classes, groups, toolbars,
//! sessions) closely enough that the coordinator cannot tell the difference,
//! including the unique class-name constraint.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::*;
use crate::error::{ClassroomError, Result};

#[derive(Default)]
struct Tables {
    next_class_id: u64,
    next_admin_id: u64,
    classes: BTreeMap<u64, ClassRecord>,
    groups: HashMap<u64, BTreeSet<u32>>,
    toolbars: HashMap<u64, Vec<ToolbarRecord>>,
    admins: HashMap<u64, AdminRecord>,
    sessions: HashMap<u64, SessionRecord>,
}

/// In-memory `ClassroomStore`
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables {
                next_class_id: 1,
                next_admin_id: 1,
                ..Tables::default()
            })),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_class(class_id: u64) -> ClassroomError {
    ClassroomError::PersistenceError(format!("Class {} does not exist.", class_id))
}

#[async_trait]
impl ClassroomStore for MemoryStore {
    async fn create_class(
        &self,
        class_name: &str,
        group_count: u32,
        admin_id: Option<u64>,
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;

        if tables.classes.values().any(|c| c.class_name == class_name) {
            return Err(ClassroomError::PersistenceError(format!(
                "Class name {} already exists.",
                class_name
            )));
        }

        let class_id = tables.next_class_id;
        tables.next_class_id += 1;

        tables.classes.insert(
            class_id,
            ClassRecord {
                class_id,
                admin_id,
                class_name: class_name.to_string(),
                created_at: Utc::now(),
            },
        );
        tables.groups.insert(class_id, (1..=group_count).collect());

        Ok(class_id)
    }

    async fn create_group(&self, class_id: u64) -> Result<u32> {
        let mut tables = self.tables.write().await;
        let groups = tables
            .groups
            .get_mut(&class_id)
            .ok_or_else(|| missing_class(class_id))?;

        let group_id = groups.iter().next_back().map(|g| g + 1).unwrap_or(1);
        groups.insert(group_id);
        Ok(group_id)
    }

    async fn delete_group(&self, class_id: u64, group_id: u32) -> Result<()> {
        let mut tables = self.tables.write().await;
        let groups = tables
            .groups
            .get_mut(&class_id)
            .ok_or_else(|| missing_class(class_id))?;
        groups.remove(&group_id);
        Ok(())
    }

    async fn delete_class(&self, class_id: u64) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.classes.remove(&class_id).is_none() {
            return Err(missing_class(class_id));
        }
        // Cascade like the foreign keys would
        tables.groups.remove(&class_id);
        tables.toolbars.remove(&class_id);
        Ok(())
    }

    async fn get_classes(&self, admin_id: Option<u64>) -> Result<Vec<ClassRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .classes
            .values()
            .filter(|c| admin_id.is_none() || c.admin_id == admin_id)
            .cloned()
            .collect())
    }

    async fn get_toolbars(&self, class_id: u64) -> Result<Vec<ToolbarRecord>> {
        let tables = self.tables.read().await;
        if !tables.classes.contains_key(&class_id) {
            return Err(missing_class(class_id));
        }
        Ok(tables.toolbars.get(&class_id).cloned().unwrap_or_default())
    }

    async fn create_toolbar(&self, class_id: u64, toolbar: ToolbarRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.classes.contains_key(&class_id) {
            return Err(missing_class(class_id));
        }

        let toolbars = tables.toolbars.entry(class_id).or_default();
        toolbars.retain(|t| t.toolbar_name != toolbar.toolbar_name);
        toolbars.push(toolbar);
        Ok(())
    }

    async fn delete_toolbar(&self, class_id: u64, toolbar_name: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(toolbars) = tables.toolbars.get_mut(&class_id) {
            toolbars.retain(|t| t.toolbar_name != toolbar_name);
        }
        Ok(())
    }

    async fn check_user(&self, username: &str) -> Result<Option<AdminRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .admins
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<u64> {
        let mut tables = self.tables.write().await;
        if tables.admins.values().any(|a| a.username == username) {
            return Err(ClassroomError::PersistenceError(format!(
                "Admin {} already exists.",
                username
            )));
        }

        let admin_id = tables.next_admin_id;
        tables.next_admin_id += 1;
        tables.admins.insert(
            admin_id,
            AdminRecord {
                admin_id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(admin_id)
    }

    async fn create_session(&self, admin_id: u64, token_hash: &str) -> Result<()> {
        let now = Utc::now();
        self.tables.write().await.sessions.insert(
            admin_id,
            SessionRecord {
                admin_id,
                token_hash: token_hash.to_string(),
                created_at: now,
                last_updated: now,
            },
        );
        Ok(())
    }

    async fn check_session(&self, admin_id: u64) -> Result<Option<SessionRecord>> {
        Ok(self.tables.read().await.sessions.get(&admin_id).cloned())
    }

    async fn delete_session(&self, admin_id: u64) -> Result<()> {
        self.tables.write().await.sessions.remove(&admin_id);
        Ok(())
    }

    async fn update_time(&self, admin_id: u64) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(session) = tables.sessions.get_mut(&admin_id) {
            session.last_updated = Utc::now();
        }
        Ok(())
    }
}
