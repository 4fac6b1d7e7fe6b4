//! Password hashing and verification
//!
//! New digests are Argon2id PHC strings, so salt and cost parameters travel
//! with the hash. Configurations carried over from older gateways store
//! bcrypt digests (`$2a$`, `$2b$`, `$2y$`); those are verified with bcrypt.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::{GatewayError, Result};

const BCRYPT_HASH_LEN: usize = 60;
const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

fn is_bcrypt(hash: &str) -> bool {
    BCRYPT_PREFIXES.iter().any(|prefix| hash.starts_with(prefix))
}

/// Hash a password using Argon2id
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GatewayError::Internal(format!("Failed to hash password: {e}")))
}

/// Check that a stored digest is a well-formed bcrypt or PHC string
pub fn validate_hash(hash: &str) -> Result<()> {
    if is_bcrypt(hash) {
        if hash.len() != BCRYPT_HASH_LEN {
            return Err(GatewayError::Config(format!(
                "Invalid bcrypt hash: expected {BCRYPT_HASH_LEN} characters, got {}",
                hash.len()
            )));
        }
        return hash
            .parse::<bcrypt::HashParts>()
            .map(|_| ())
            .map_err(|e| GatewayError::Config(format!("Invalid bcrypt hash: {e}")));
    }
    PasswordHash::new(hash)
        .map(|_| ())
        .map_err(|e| GatewayError::Config(format!("Invalid password hash format: {e}")))
}

/// Verify a password against a stored hash
///
/// Returns true if the password matches the hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    if is_bcrypt(hash) {
        return bcrypt::verify(password, hash)
            .map_err(|e| GatewayError::Config(format!("Invalid bcrypt hash: {e}")));
    }

    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| GatewayError::Config(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
