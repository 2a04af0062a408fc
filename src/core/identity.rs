//! External class handles
//!
//! Internal class ids are sequential store keys. Clients only ever see a
//! random handle, and the mapping back lives solely in this table, so a
//! handle reveals nothing about other classes.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::constants::HANDLE_LENGTH;
use crate::error::{ClassroomError, Result};

#[derive(Default)]
struct HandleTable {
    by_handle: HashMap<String, u64>,
    by_id: HashMap<u64, String>,
}

/// Maps opaque class handles to internal class ids
pub struct IdentityResolver {
    table: Mutex<HandleTable>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HandleTable::default()),
        }
    }

    fn generate_handle() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(HANDLE_LENGTH)
            .map(char::from)
            .collect()
    }

    /// Issue a handle for an internal id. Re-issuing for a known id returns
    /// the existing handle.
    pub fn add(&self, internal_id: u64) -> Result<String> {
        let mut table = self.table.lock()?;

        if let Some(existing) = table.by_id.get(&internal_id) {
            return Ok(existing.clone());
        }

        let mut handle = Self::generate_handle();
        while table.by_handle.contains_key(&handle) {
            handle = Self::generate_handle();
        }

        table.by_handle.insert(handle.clone(), internal_id);
        table.by_id.insert(internal_id, handle.clone());
        Ok(handle)
    }

    /// Resolve a handle back to its internal id
    pub fn resolve(&self, handle: &str) -> Result<u64> {
        self.table
            .lock()?
            .by_handle
            .get(handle)
            .copied()
            .ok_or_else(|| ClassroomError::UnknownClass(handle.to_string()))
    }

    /// Handle previously issued for an internal id, if still live
    pub fn handle_of(&self, internal_id: u64) -> Result<Option<String>> {
        Ok(self.table.lock()?.by_id.get(&internal_id).cloned())
    }

    /// Invalidate a handle; later resolutions fail
    pub fn remove(&self, handle: &str) -> Result<()> {
        let mut table = self.table.lock()?;
        if let Some(id) = table.by_handle.remove(handle) {
            table.by_id.remove(&id);
        }
        Ok(())
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedIdentity = Arc<IdentityResolver>;
