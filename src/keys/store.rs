//! Partner public key store
//!
//! Fingerprint -> X25519 public key. The watcher task is the only writer;
//! dispatchers read. A single mutex guards every access and is never held
//! across I/O.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use x25519_dalek::PublicKey;

use crate::types::{GatewayError, Result};

#[derive(Default)]
pub struct KeyStore {
    keys: Mutex<HashMap<String, PublicKey>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, PublicKey>> {
        // Entries are inserted or removed whole, so a poisoned map is still consistent.
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the public key for a fingerprint
    pub fn lookup(&self, fingerprint: &str) -> Result<PublicKey> {
        self.guard()
            .get(fingerprint)
            .copied()
            .ok_or_else(|| GatewayError::KeyNotFound(fingerprint.to_string()))
    }

    /// Insert a key, replacing any previous key under the same fingerprint
    pub fn insert(&self, fingerprint: impl Into<String>, key: PublicKey) -> Option<PublicKey> {
        self.guard().insert(fingerprint.into(), key)
    }

    pub fn remove(&self, fingerprint: &str) -> Option<PublicKey> {
        self.guard().remove(fingerprint)
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.guard().contains_key(fingerprint)
    }

    /// Sorted list of known fingerprints
    pub fn fingerprints(&self) -> Vec<String> {
        let mut list: Vec<String> = self.guard().keys().cloned().collect();
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}
