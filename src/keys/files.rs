//! Key file loading
//!
//! Every key file holds a single hex-encoded 32-byte value. Partner files
//! carry X25519 public keys; the gateway's own file carries the Ed25519
//! signing seed. A key's fingerprint is its file stem, which stays
//! derivable after the file is gone.

use ed25519_dalek::{SigningKey, VerifyingKey};
use std::path::Path;
use x25519_dalek::PublicKey;
use zeroize::Zeroizing;

use crate::types::{GatewayError, Result};

/// Length of every raw key handled by the gateway
pub const KEY_LEN: usize = 32;

/// Fingerprint for a key file: its name without the extension
pub fn fingerprint_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// Whether `path` is a key file with the configured extension
pub fn has_key_extension(path: &Path, extension: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.len() > extension.len() && name.ends_with(extension))
        .unwrap_or(false)
}

/// Decode a hex-encoded 32-byte key, ignoring surrounding whitespace
pub fn decode_key_hex(text: &str) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let raw = Zeroizing::new(
        hex::decode(text.trim())
            .map_err(|e| GatewayError::Crypto(format!("Key is not valid hex: {e}")))?,
    );
    if raw.len() != KEY_LEN {
        return Err(GatewayError::Crypto(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LEN,
            raw.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&raw);
    Ok(key)
}

/// Load a partner public key and derive its fingerprint
pub async fn load_public_key(path: &Path) -> Result<(String, PublicKey)> {
    let fingerprint = fingerprint_for(path).ok_or_else(|| {
        GatewayError::Crypto(format!("Cannot derive fingerprint for {}", path.display()))
    })?;
    let text = tokio::fs::read_to_string(path).await?;
    let bytes = decode_key_hex(&text)?;
    Ok((fingerprint, PublicKey::from(*bytes)))
}

/// The gateway's own ticket-signing key
pub struct SigningIdentity {
    key_id: String,
    signing_key: SigningKey,
}

impl SigningIdentity {
    pub fn new(key_id: impl Into<String>, signing_key: SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            signing_key,
        }
    }

    /// Load the signing key from disk. Failure here aborts startup.
    pub fn load(path: &Path) -> Result<Self> {
        let key_id = fingerprint_for(path).ok_or_else(|| {
            GatewayError::Config(format!("Cannot derive key id for {}", path.display()))
        })?;
        let text = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!(
                "Error while reading key for signing ({}): {}",
                path.display(),
                e
            ))
        })?);
        let seed = decode_key_hex(&text).map_err(|e| {
            GatewayError::Config(format!("Error while parsing key for signing ({key_id}): {e}"))
        })?;
        Ok(Self::new(key_id, SigningKey::from_bytes(&seed)))
    }

    /// Identifier stamped into every ticket as `SignerKeyId`
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}
