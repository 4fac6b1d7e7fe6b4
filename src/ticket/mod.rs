//! Signed tickets and their encrypted transport
//!
//! A ticket carries a batch of tasks for one partner. It is signed with the
//! gateway's Ed25519 key, then encrypted under a one-off session key that is
//! wrapped for the partner's X25519 key.

pub mod codec;
pub mod envelope;
pub mod model;

pub use codec::TicketCodec;
pub use envelope::{
    decrypt_payload, encrypt_payload, flip_iv, open_envelope, open_response, seal_envelope,
    seal_response, EncryptedEnvelope, SessionSecrets,
};
pub use model::Ticket;
