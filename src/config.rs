//! Server configuration module
//! Handles runtime configuration parameters for the classroom server

use crate::constants::{
    DEFAULT_HOST, DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT, DEFAULT_SESSION_TTL_SECS,
};
use crate::error::{ClassroomError, Result};
use std::env;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret gating every admin operation
    pub admin_secret: String,
    /// Maximum accepted size of one inbound text frame
    pub max_frame_bytes: usize,
    /// Age after which an admin session is reported as expired
    pub session_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        panic!("ServerConfig::default() is not allowed: the admin secret must be configured. Use ServerConfig::from_env() instead.");
    }
}

impl ServerConfig {
    /// Configuration with a known secret. Only meant for tests.
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            admin_secret: "test-admin-secret".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }

    /// Whether the caller-supplied secret unlocks admin operations
    pub fn admin_secret_matches(&self, candidate: &str) -> bool {
        crate::security::constant_time_eq(&self.admin_secret, candidate)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any `CLASSROOM_*` key source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("CLASSROOM_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = lookup("CLASSROOM_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let max_frame_bytes = lookup("CLASSROOM_MAX_FRAME_BYTES")
            .and_then(|b| b.parse().ok())
            .unwrap_or(DEFAULT_MAX_FRAME_BYTES);

        let ttl_secs = lookup("CLASSROOM_SESSION_TTL_SECS")
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        let admin_secret = lookup("CLASSROOM_ADMIN_SECRET").ok_or_else(|| {
            ClassroomError::ConfigError(
                "CLASSROOM_ADMIN_SECRET environment variable is required".to_string(),
            )
        })?;

        if admin_secret.trim().is_empty() {
            return Err(ClassroomError::ConfigError(
                "CLASSROOM_ADMIN_SECRET must not be empty".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            admin_secret,
            max_frame_bytes,
            session_ttl: Duration::from_secs(ttl_secs),
        })
    }
}
