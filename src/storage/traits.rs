//! Abstract persistent-store interface
//!
//! The coordination engine only ever talks to durable storage through
//! `ClassroomStore`. A relational backend would implement the same trait;
//! `MemoryStore` is the bundled implementation used by the binary and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;

/// Class row as listed for an admin console
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRecord {
    pub class_id: u64,
    pub admin_id: Option<u64>,
    pub class_name: String,
    pub created_at: DateTime<Utc>,
}

/// Saved toolbar configuration of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolbarRecord {
    pub toolbar_name: String,
    /// Opaque tool descriptor chosen by the console
    pub tools: Value,
}

/// Instructor account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRecord {
    pub admin_id: u64,
    pub username: String,
    /// argon2 PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Instructor console session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub admin_id: u64,
    /// argon2 PHC string of the session token
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Persistent-store collaborator consumed by the membership coordinator.
/// Failures are reported as `ClassroomError::PersistenceError`.
#[async_trait]
pub trait ClassroomStore: Send + Sync {
    /// Create a class with groups `1..=group_count`, returning its internal id
    async fn create_class(
        &self,
        class_name: &str,
        group_count: u32,
        admin_id: Option<u64>,
    ) -> Result<u64>;

    /// Append a group to a class, returning the new group id
    async fn create_group(&self, class_id: u64) -> Result<u32>;

    async fn delete_group(&self, class_id: u64, group_id: u32) -> Result<()>;

    /// Delete a class together with its groups and toolbars
    async fn delete_class(&self, class_id: u64) -> Result<()>;

    /// List classes, optionally only those owned by one admin
    async fn get_classes(&self, admin_id: Option<u64>) -> Result<Vec<ClassRecord>>;

    async fn get_toolbars(&self, class_id: u64) -> Result<Vec<ToolbarRecord>>;

    /// Insert or replace a toolbar by name
    async fn create_toolbar(&self, class_id: u64, toolbar: ToolbarRecord) -> Result<()>;

    async fn delete_toolbar(&self, class_id: u64, toolbar_name: &str) -> Result<()>;

    /// Look up an admin account by username
    async fn check_user(&self, username: &str) -> Result<Option<AdminRecord>>;

    /// Create an admin account, returning its id
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<u64>;

    /// Start (or replace) the session of an admin
    async fn create_session(&self, admin_id: u64, token_hash: &str) -> Result<()>;

    async fn check_session(&self, admin_id: u64) -> Result<Option<SessionRecord>>;

    async fn delete_session(&self, admin_id: u64) -> Result<()>;

    /// Refresh the `last_updated` timestamp of an admin session
    async fn update_time(&self, admin_id: u64) -> Result<()>;
}

/// Shared handle to the configured store
pub type SharedStore = Arc<dyn ClassroomStore>;
