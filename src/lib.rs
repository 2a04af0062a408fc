//! Classroom Sync - real-time classroom collaboration over WebSockets
//!
//! Students join a class, split into groups and share positions and
//! diagrams with their group and the instructor console. This crate holds
//! the in-memory coordination engine and the `warp` transport around it.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod security;
pub mod storage;

// Re-export main components
pub use config::*;
pub use constants::*;
