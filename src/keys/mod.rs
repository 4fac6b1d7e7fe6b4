//! Partner key management
//!
//! - [`KeyStore`]: fingerprint -> X25519 public key, shared with dispatchers
//! - [`DirectoryWatcher`]: turns the key directory into add/remove events
//! - [`spawn_key_sync`]: the background task applying those events
//! - [`SigningIdentity`]: the gateway's own Ed25519 ticket-signing key

pub mod files;
pub mod store;
pub mod sync;
pub mod watcher;

pub use files::{fingerprint_for, load_public_key, SigningIdentity};
pub use store::KeyStore;
pub use sync::{apply_event, load_initial, spawn_key_sync};
pub use watcher::{DirectoryWatcher, KeyEvent};
