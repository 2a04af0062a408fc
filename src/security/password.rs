//! argon2 hashing for admin passwords and session tokens

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{ClassroomError, Result};

/// Hash a secret into a PHC string with a fresh random salt
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| ClassroomError::PersistenceError(format!("Salt encoding failed: {}", e)))?;

    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ClassroomError::PersistenceError(format!("Hashing failed: {}", e)))
}

/// Check a secret against a stored PHC string. Malformed hashes never verify.
pub fn verify_secret(secret: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
