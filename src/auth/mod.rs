//! Authentication for taskgate
//!
//! Provides:
//! - Password hashing with Argon2
//! - The static user store consulted by task submission and the sample proxy

pub mod password;
pub mod users;

pub use password::{hash_password, verify_password};
pub use users::UserStore;
