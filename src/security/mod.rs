//! Input sanitization, secret comparison and hashing helpers

pub mod password;
pub mod timing;
pub mod xss;

pub use password::{hash_secret, verify_secret};
pub use timing::constant_time_eq;
pub use xss::{encode_angle_brackets, sanitize_value};
