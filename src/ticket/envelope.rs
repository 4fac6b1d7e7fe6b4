//! Hybrid encryption of tickets
//!
//! # Algorithms
//!
//! - **Payload**: ChaCha20-Poly1305 under a fresh 32-byte session key and
//!   12-byte IV
//! - **Key wrapping**: ephemeral X25519 against the recipient's public key,
//!   SHA-256 of the shared secret as wrap key, ChaCha20-Poly1305 seal
//! - **Replies**: same session key, IV with the low bit of byte 0 flipped,
//!   so a request and its reply are never sealed under the same key/IV pair
//!
//! Wrapped key layout: `ephemeral_pub (32) || sealed_key + tag (48) || nonce (12)`.

use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::model::base64_bytes;
use crate::types::{GatewayError, Result};

/// Session key length (ChaCha20-Poly1305 key)
pub const SESSION_KEY_LEN: usize = 32;

/// IV length (ChaCha20-Poly1305 nonce)
pub const IV_LEN: usize = 12;

/// ChaCha20-Poly1305 auth tag length
pub const AUTH_TAG_LEN: usize = 16;

/// Total length of a wrapped session key
pub const WRAPPED_KEY_LEN: usize = 32 + SESSION_KEY_LEN + AUTH_TAG_LEN + IV_LEN;

const WRAP_DOMAIN: &[u8] = b"taskgate_session_key_wrap_v1";

/// Query parameter names of the outbound ticket protocol
pub const PARAM_KEY_FINGERPRINT: &str = "KeyFingerprint";
pub const PARAM_ENCRYPTED_KEY: &str = "EncryptedKey";
pub const PARAM_IV: &str = "IV";
pub const PARAM_ENCRYPTED: &str = "Encrypted";

/// One ticket, encrypted for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncryptedEnvelope {
    /// Which recipient key the session key was wrapped with
    pub key_fingerprint: String,
    #[serde(with = "base64_bytes")]
    pub encrypted_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub encrypted: Vec<u8>,
    #[serde(rename = "IV", with = "base64_bytes")]
    pub iv: Vec<u8>,
}

impl EncryptedEnvelope {
    /// The four query parameters sent to a partner, binary fields in base64
    pub fn query_pairs(&self) -> [(&'static str, String); 4] {
        use base64::{engine::general_purpose::STANDARD, Engine};
        [
            (PARAM_KEY_FINGERPRINT, self.key_fingerprint.clone()),
            (PARAM_ENCRYPTED_KEY, STANDARD.encode(&self.encrypted_key)),
            (PARAM_IV, STANDARD.encode(&self.iv)),
            (PARAM_ENCRYPTED, STANDARD.encode(&self.encrypted)),
        ]
    }

    /// Rebuild an envelope from a received query string
    pub fn from_query(query: &str) -> Result<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let mut fingerprint = None;
        let mut encrypted_key = None;
        let mut iv = None;
        let mut encrypted = None;
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let decode = |v: &str| {
                STANDARD
                    .decode(v)
                    .map_err(|e| GatewayError::Decode(format!("{name} is not base64: {e}")))
            };
            match name.as_ref() {
                PARAM_KEY_FINGERPRINT => fingerprint = Some(value.into_owned()),
                PARAM_ENCRYPTED_KEY => encrypted_key = Some(decode(&value)?),
                PARAM_IV => iv = Some(decode(&value)?),
                PARAM_ENCRYPTED => encrypted = Some(decode(&value)?),
                _ => {}
            }
        }

        let missing = |param: &str| GatewayError::Decode(format!("Missing {param}"));
        Ok(Self {
            key_fingerprint: fingerprint.ok_or_else(|| missing(PARAM_KEY_FINGERPRINT))?,
            encrypted_key: encrypted_key.ok_or_else(|| missing(PARAM_ENCRYPTED_KEY))?,
            encrypted: encrypted.ok_or_else(|| missing(PARAM_ENCRYPTED))?,
            iv: iv.ok_or_else(|| missing(PARAM_IV))?,
        })
    }
}

/// Per-dispatch symmetric material
pub struct SessionSecrets {
    key: Zeroizing<[u8; SESSION_KEY_LEN]>,
    iv: [u8; IV_LEN],
}

impl SessionSecrets {
    /// Draw a fresh key and IV from the OS RNG
    ///
    /// An RNG failure is an error for this dispatch only.
    pub fn generate() -> Result<Self> {
        let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
        let mut iv = [0u8; IV_LEN];
        fill_random(key.as_mut())?;
        fill_random(&mut iv)?;
        Ok(Self { key, iv })
    }

    pub fn from_parts(key: [u8; SESSION_KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
            iv,
        }
    }

    pub fn key(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// IV used for the partner's reply
    pub fn response_iv(&self) -> [u8; IV_LEN] {
        flip_iv(&self.iv)
    }
}

/// Flip the low bit of the first IV byte
pub fn flip_iv(iv: &[u8; IV_LEN]) -> [u8; IV_LEN] {
    let mut flipped = *iv;
    flipped[0] ^= 1;
    flipped
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| GatewayError::Crypto(format!("Random source unavailable: {e}")))
}

/// Encrypt a payload with the session key
pub fn encrypt_payload(
    plaintext: &[u8],
    key: &[u8; SESSION_KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>> {
    ChaCha20Poly1305::new(Key::from_slice(key))
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|e| GatewayError::Crypto(format!("Encryption failed: {e}")))
}

/// Decrypt a payload sealed with [`encrypt_payload`]
pub fn decrypt_payload(
    ciphertext: &[u8],
    key: &[u8; SESSION_KEY_LEN],
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>> {
    ChaCha20Poly1305::new(Key::from_slice(key))
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| GatewayError::Crypto("Decryption failed".to_string()))
}

fn derive_wrap_key(
    shared: &[u8; 32],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(WRAP_DOMAIN);
    hasher.update(shared);
    hasher.update(ephemeral.as_bytes());
    hasher.update(recipient.as_bytes());
    Zeroizing::new(hasher.finalize().into())
}

/// Wrap a session key for the holder of `recipient`'s private key
pub fn wrap_session_key(key: &[u8; SESSION_KEY_LEN], recipient: &PublicKey) -> Result<Vec<u8>> {
    let mut ephemeral_bytes = Zeroizing::new([0u8; 32]);
    fill_random(ephemeral_bytes.as_mut())?;
    let ephemeral_secret = StaticSecret::from(*ephemeral_bytes);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared = ephemeral_secret.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(GatewayError::Crypto(
            "Recipient key is a low-order point".to_string(),
        ));
    }
    let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral_public, recipient);

    let mut nonce = [0u8; IV_LEN];
    fill_random(&mut nonce)?;
    let sealed = encrypt_payload(key, &wrap_key, &nonce)?;

    let mut wrapped = Vec::with_capacity(WRAPPED_KEY_LEN);
    wrapped.extend_from_slice(ephemeral_public.as_bytes());
    wrapped.extend_from_slice(&sealed);
    wrapped.extend_from_slice(&nonce);
    Ok(wrapped)
}

/// Recover a session key with the recipient's private key
pub fn unwrap_session_key(
    wrapped: &[u8],
    secret: &StaticSecret,
) -> Result<Zeroizing<[u8; SESSION_KEY_LEN]>> {
    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(GatewayError::Crypto(format!(
            "Invalid wrapped key length: expected {}, got {}",
            WRAPPED_KEY_LEN,
            wrapped.len()
        )));
    }

    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(&wrapped[..32]);
    let ephemeral = PublicKey::from(ephemeral);
    let sealed = &wrapped[32..32 + SESSION_KEY_LEN + AUTH_TAG_LEN];
    let mut nonce = [0u8; IV_LEN];
    nonce.copy_from_slice(&wrapped[WRAPPED_KEY_LEN - IV_LEN..]);

    let shared = secret.diffie_hellman(&ephemeral);
    let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral, &PublicKey::from(secret));
    let plain = Zeroizing::new(decrypt_payload(sealed, &wrap_key, &nonce)?);

    let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    key.copy_from_slice(&plain);
    Ok(key)
}

/// Build an envelope for a recipient whose key is already resolved
pub fn seal_envelope(
    ticket_bytes: &[u8],
    fingerprint: &str,
    recipient: &PublicKey,
    secrets: &SessionSecrets,
) -> Result<EncryptedEnvelope> {
    let encrypted_key = wrap_session_key(secrets.key(), recipient)?;
    let encrypted = encrypt_payload(ticket_bytes, secrets.key(), secrets.iv())?;
    Ok(EncryptedEnvelope {
        key_fingerprint: fingerprint.to_string(),
        encrypted_key,
        encrypted,
        iv: secrets.iv().to_vec(),
    })
}

/// Recipient side: recover the ticket bytes and the session secrets
pub fn open_envelope(
    envelope: &EncryptedEnvelope,
    secret: &StaticSecret,
) -> Result<(Vec<u8>, SessionSecrets)> {
    let iv: [u8; IV_LEN] = envelope.iv.as_slice().try_into().map_err(|_| {
        GatewayError::Crypto(format!(
            "Invalid IV length: expected {}, got {}",
            IV_LEN,
            envelope.iv.len()
        ))
    })?;
    let key = unwrap_session_key(&envelope.encrypted_key, secret)?;
    let secrets = SessionSecrets::from_parts(*key, iv);
    let ticket = decrypt_payload(&envelope.encrypted, secrets.key(), secrets.iv())?;
    Ok((ticket, secrets))
}

/// Recipient side: encrypt a reply body
pub fn seal_response(body: &[u8], secrets: &SessionSecrets) -> Result<Vec<u8>> {
    encrypt_payload(body, secrets.key(), &secrets.response_iv())
}

/// Sender side: decrypt a reply body
pub fn open_response(body: &[u8], secrets: &SessionSecrets) -> Result<Vec<u8>> {
    decrypt_payload(body, secrets.key(), &secrets.response_iv())
}
