use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::ticket::{open_response, SessionSecrets, TicketCodec};
use crate::types::{GatewayError, Organization, Result, Task, TaskError};

/// Sends ticket-wrapped task batches to partner endpoints
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    codec: TicketCodec,
}

impl Dispatcher {
    /// Create a dispatcher whose outbound calls are bounded by `timeout`
    pub fn new(codec: TicketCodec, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("taskgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(format!("Couldn't build HTTP client: {e}")))?;
        Ok(Self { client, codec })
    }

    pub fn codec(&self) -> &TicketCodec {
        &self.codec
    }

    /// Deliver `tasks` to `organization` and return its per-task errors
    ///
    /// The first task's source selects the partner key for the whole batch.
    /// Network, key and crypto failures come back as `Err`; a reply that
    /// decrypts but is not a JSON error list becomes one `Decode` record per
    /// task.
    pub async fn send(&self, tasks: &[Task], organization: &Organization) -> Result<Vec<TaskError>> {
        let Some(first) = tasks.first() else {
            return Ok(Vec::new());
        };
        let fingerprint = first.source.as_str();

        let sources: BTreeSet<&str> = tasks.iter().map(|t| t.source.as_str()).collect();
        if sources.len() > 1 {
            warn!(
                organization = %organization.name,
                fingerprint = %fingerprint,
                sources = ?sources,
                "Batch mixes sources; encrypting every task to the first task's key"
            );
        }

        let secrets = SessionSecrets::generate()?;
        let ticket = self.codec.create_ticket(tasks.to_vec())?;
        let ticket_bytes = ticket.to_bytes()?;
        let envelope = self
            .codec
            .encrypt_envelope(&ticket_bytes, fingerprint, &secrets)?;

        debug!(
            organization = %organization.name,
            fingerprint = %fingerprint,
            tasks = tasks.len(),
            "Sending ticket"
        );

        let response = self
            .client
            .get(&organization.uri)
            .query(&envelope.query_pairs()[..])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transport(format!(
                "{} answered with HTTP {}",
                organization.name, status
            )));
        }

        let body = response.bytes().await?;
        let plain = open_response(&body, &secrets).map_err(|_| {
            GatewayError::Decode(format!(
                "Couldn't decrypt response from {}",
                organization.name
            ))
        })?;

        match serde_json::from_slice::<Vec<TaskError>>(&plain) {
            Ok(errors) => {
                debug!(
                    organization = %organization.name,
                    errors = errors.len(),
                    "Organization answered"
                );
                Ok(errors)
            }
            Err(e) => {
                warn!(organization = %organization.name, error = %e, "Couldn't parse result");
                let err = GatewayError::Decode(format!("Couldn't parse result: {e}"));
                Ok(tasks
                    .iter()
                    .cloned()
                    .map(|task| TaskError::from_error(task, &err))
                    .collect())
            }
        }
    }
}
