//! Ticket issuance: build, sign and encrypt one ticket per dispatch

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::envelope::{seal_envelope, EncryptedEnvelope, SessionSecrets};
use super::model::Ticket;
use crate::keys::{KeyStore, SigningIdentity};
use crate::types::{Result, Task};

/// Signs tickets with the gateway identity and encrypts them for partners
#[derive(Clone)]
pub struct TicketCodec {
    identity: Arc<SigningIdentity>,
    keys: Arc<KeyStore>,
    validity: Duration,
}

impl TicketCodec {
    pub fn new(identity: Arc<SigningIdentity>, keys: Arc<KeyStore>, validity: Duration) -> Self {
        Self {
            identity,
            keys,
            validity,
        }
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// Build and sign a ticket for `tasks`, expiring `validity` from now
    pub fn create_ticket(&self, tasks: Vec<Task>) -> Result<Ticket> {
        let mut ticket = Ticket::unsigned(tasks, self.identity.key_id(), Utc::now(), self.validity)?;
        ticket.sign(self.identity.signing_key())?;
        Ok(ticket)
    }

    /// Encrypt serialized ticket bytes for the key registered as `fingerprint`
    ///
    /// Fails with `KeyNotFound` when no such key is currently loaded.
    pub fn encrypt_envelope(
        &self,
        ticket_bytes: &[u8],
        fingerprint: &str,
        secrets: &SessionSecrets,
    ) -> Result<EncryptedEnvelope> {
        let recipient = self.keys.lookup(fingerprint)?;
        seal_envelope(ticket_bytes, fingerprint, &recipient, secrets)
    }
}
