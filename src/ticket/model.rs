//! Ticket: a signed, time-limited batch of tasks
//!
//! The signature covers the exact compact JSON of the ticket with an empty
//! `Signature`. Verifiers must see those same bytes, so [`Ticket::verify`]
//! refuses anything that is not the canonical serialization of what it
//! parsed.

use chrono::{DateTime, SubsecRound, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{GatewayError, Result, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ticket {
    pub expiration: DateTime<Utc>,
    pub tasks: Vec<Task>,
    /// Identifies the key that signed this ticket
    pub signer_key_id: String,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl Ticket {
    /// Unsigned ticket valid for `validity` from `now`
    pub fn unsigned(
        tasks: Vec<Task>,
        signer_key_id: impl Into<String>,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> Result<Self> {
        let validity = chrono::Duration::from_std(validity)
            .map_err(|e| GatewayError::Config(format!("Invalid ticket validity: {e}")))?;
        let expiration = now
            .trunc_subsecs(0)
            .checked_add_signed(validity)
            .ok_or_else(|| GatewayError::Config("Ticket validity out of range".to_string()))?;
        Ok(Self {
            expiration,
            tasks,
            signer_key_id: signer_key_id.into(),
            signature: Vec::new(),
        })
    }

    /// The bytes a signature is computed over
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let unsigned = Self {
            signature: Vec::new(),
            ..self.clone()
        };
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Sign in place with the gateway key
    pub fn sign(&mut self, key: &SigningKey) -> Result<()> {
        let message = self.signing_bytes()?;
        self.signature = key.sign(&message).to_bytes().to_vec();
        Ok(())
    }

    /// Wire serialization (what gets encrypted and transmitted)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Parse and verify a received ticket
    pub fn verify(bytes: &[u8], key: &VerifyingKey, now: DateTime<Utc>) -> Result<Self> {
        let ticket: Ticket = serde_json::from_slice(bytes)?;

        if ticket.to_bytes()? != bytes {
            return Err(GatewayError::Crypto(
                "Ticket is not in canonical form".to_string(),
            ));
        }

        let signature = Signature::from_slice(&ticket.signature)
            .map_err(|e| GatewayError::Crypto(format!("Malformed ticket signature: {e}")))?;
        key.verify_strict(&ticket.signing_bytes()?, &signature)
            .map_err(|_| GatewayError::Crypto("Ticket signature invalid".to_string()))?;

        if ticket.is_expired(now) {
            return Err(GatewayError::Crypto(format!(
                "Ticket expired at {}",
                ticket.expiration
            )));
        }

        Ok(ticket)
    }
}

/// Serialize bytes as standard base64 text
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
