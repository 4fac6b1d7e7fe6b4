//! Configuration for taskgate
//!
//! CLI arguments and environment variables are handled with clap; the
//! gateway's organizations, users and key paths come from a JSON file
//! named by `--config`.

use clap::Parser;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{GatewayError, Organization, Result, User};

/// Default ticket lifetime (3 hours)
pub const DEFAULT_TICKET_VALIDITY_SECS: u64 = 3 * 60 * 60;

/// Upper bound on ticket lifetime (30 days)
pub const MAX_TICKET_VALIDITY_SECS: u64 = 30 * 24 * 60 * 60;

/// Default extension for partner public key files
pub const DEFAULT_KEY_EXTENSION: &str = ".pub";

/// taskgate - federation gateway for analysis tasks
#[derive(Parser, Debug, Clone)]
#[command(name = "taskgate")]
#[command(about = "Routes analysis tasks to partner organizations as signed, encrypted tickets")]
pub struct Args {
    /// Path to the JSON gateway configuration file
    #[arg(long, env = "CONFIG_PATH")]
    pub config: PathBuf,

    /// Override the bind address from the configuration file
    #[arg(long, env = "LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Timeout for every outbound call to partners and storage, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// How often the key directory is rescanned, in milliseconds
    #[arg(long, env = "KEY_POLL_INTERVAL_MS", default_value = "2000")]
    pub key_poll_interval_ms: u64,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn key_poll_interval(&self) -> Duration {
        Duration::from_millis(self.key_poll_interval_ms)
    }

    /// Validate argument values that clap cannot check on its own
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.key_poll_interval_ms == 0 {
            return Err("KEY_POLL_INTERVAL_MS must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Gateway configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayConfig {
    /// Bind address for the HTTPS listener (IP:port)
    #[serde(rename = "HTTP")]
    pub http: String,
    /// Directory holding one public key per partner source
    pub sources_keys_path: PathBuf,
    /// Private key used for signing tickets
    pub ticket_sign_key_path: PathBuf,
    pub organizations: Vec<Organization>,
    /// Name of our own organization (must appear in `organizations`)
    pub own_organization: String,
    /// Base URI of the object storage service
    #[serde(rename = "StorageURI")]
    pub storage_uri: String,
    /// Base URI partners use to download stored objects; defaults to `StorageURI`
    #[serde(rename = "StorageRetrievalURI", default)]
    pub storage_retrieval_uri: Option<String>,
    /// Analyzers run automatically on every successful upload
    #[serde(default)]
    pub auto_tasks: BTreeMap<String, Vec<String>>,
    pub certificate_path: PathBuf,
    pub certificate_key_path: PathBuf,
    #[serde(default)]
    pub allowed_users: Vec<User>,
    #[serde(default = "default_key_extension")]
    pub key_extension: String,
    #[serde(default = "default_ticket_validity")]
    pub ticket_validity_secs: u64,
}

fn default_key_extension() -> String {
    DEFAULT_KEY_EXTENSION.to_string()
}

fn default_ticket_validity() -> u64 {
    DEFAULT_TICKET_VALIDITY_SECS
}

impl GatewayConfig {
    /// Read and validate the configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Couldn't read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document without validating it
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| GatewayError::Config(format!("Invalid config file: {}", e)))
    }

    /// Base URI used to build `PrimaryURI` for automatic tasks
    pub fn retrieval_base(&self) -> &str {
        self.storage_retrieval_uri.as_deref().unwrap_or(&self.storage_uri)
    }

    pub fn ticket_validity(&self) -> Duration {
        Duration::from_secs(self.ticket_validity_secs)
    }

    /// Parsed bind address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.http
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid HTTP address {}: {}", self.http, e)))
    }

    /// Validate configuration
    ///
    /// A source claimed by two organizations is rejected outright instead of
    /// letting the later declaration win.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if self.organizations.is_empty() {
            return Err(GatewayError::Config("No organizations configured".to_string()));
        }

        if !self
            .organizations
            .iter()
            .any(|org| org.name == self.own_organization)
        {
            return Err(GatewayError::Config(format!(
                "Own organization {} was not found",
                self.own_organization
            )));
        }

        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for org in &self.organizations {
            for source in &org.sources {
                if let Some(previous) = owners.insert(source.as_str(), org.name.as_str()) {
                    return Err(GatewayError::Config(format!(
                        "Source {} is declared by both {} and {}",
                        source, previous, org.name
                    )));
                }
            }
        }

        let mut names = HashSet::new();
        for user in &self.allowed_users {
            if !names.insert(user.name.as_str()) {
                return Err(GatewayError::Config(format!("Duplicate user {}", user.name)));
            }
        }

        if self.ticket_validity_secs == 0 {
            return Err(GatewayError::Config("TicketValiditySecs must be positive".to_string()));
        }
        if self.ticket_validity_secs > MAX_TICKET_VALIDITY_SECS {
            return Err(GatewayError::Config(format!(
                "TicketValiditySecs must not exceed {MAX_TICKET_VALIDITY_SECS}"
            )));
        }

        if url::Url::parse(&self.storage_uri).is_err() {
            return Err(GatewayError::Config(format!(
                "Invalid StorageURI {}",
                self.storage_uri
            )));
        }

        Ok(())
    }
}
