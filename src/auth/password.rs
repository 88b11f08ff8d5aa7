//! Argon2id password hashing.
//!
//! Uses the crate defaults (m = 19 MiB, t = 2, p = 1) as the fixed work
//! factor. The parameters are embedded in each PHC string, so raising them
//! later keeps old hashes verifiable.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::DirectoryError;

pub fn hash_password(plain: &str) -> Result<String, DirectoryError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            DirectoryError::Internal(format!("password hashing failed: {e}"))
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, DirectoryError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        DirectoryError::Internal(format!("stored hash unreadable: {e}"))
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
