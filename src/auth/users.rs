//! Static user store
//!
//! Users come from the configuration file and never change at runtime.
//! Digests may be Argon2 PHC strings or bcrypt. Unknown names are checked
//! against an Argon2 decoy digest so a miss still costs a full comparison.

use std::collections::HashMap;
use tracing::{debug, error, info};

use super::password::{hash_password, validate_hash, verify_password};
use crate::types::{GatewayError, Result, User};

/// Username -> user lookup with timing-uniform authentication
pub struct UserStore {
    users: HashMap<String, User>,
    decoy_hash: String,
}

impl UserStore {
    /// Build the store, rejecting malformed password digests
    pub fn new(users: Vec<User>) -> Result<Self> {
        for user in &users {
            validate_hash(&user.password_hash).map_err(|e| {
                GatewayError::Config(format!("User {}: {}", user.name, e))
            })?;
        }

        let decoy_hash = hash_password(&hex::encode(rand::random::<[u8; 16]>()))?;
        let users = users
            .into_iter()
            .map(|user| (user.name.clone(), user))
            .collect();

        Ok(Self { users, decoy_hash })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Verify a username/password pair
    ///
    /// Every failure is the same [`GatewayError::Auth`], whether the user is
    /// unknown or the password is wrong.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<&User> {
        let Some(user) = self.users.get(username) else {
            // Burn the same work as a real comparison; the outcome is irrelevant.
            let _ = verify_password(password, &self.decoy_hash);
            debug!("Authentication failed");
            return Err(GatewayError::Auth);
        };

        match verify_password(password, &user.password_hash) {
            Ok(true) => {
                info!(user = %user.name, "Authenticated");
                Ok(user)
            }
            Ok(false) => {
                debug!("Authentication failed");
                Err(GatewayError::Auth)
            }
            Err(e) => {
                error!(user = %user.name, error = %e, "Stored password hash unusable");
                Err(GatewayError::Auth)
            }
        }
    }
}
