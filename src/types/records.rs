//! Wire and configuration records shared across the gateway
//!
//! Field names follow the PascalCase JSON used by partner organizations
//! and by the gateway configuration file.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use super::error::{ErrorKind, GatewayError};

/// Treat an explicit JSON `null` like a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One analysis request for a single object
///
/// `source` decides both where the task is routed and which partner key
/// encrypts the ticket carrying it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    #[serde(rename = "PrimaryURI", default)]
    pub primary_uri: String,
    #[serde(rename = "SecondaryURI", default)]
    pub secondary_uri: String,
    #[serde(default)]
    pub filename: String,
    /// Analyzer name -> ordered argument list. Ordered map so that a ticket
    /// serializes to the same bytes every time.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub download: bool,
}

/// Per-task failure record returned to clients
///
/// Partner organizations answer with arrays of these; they may omit `Kind`,
/// which then reads as [`ErrorKind::Remote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(rename = "TaskStruct")]
    pub task: Task,
    #[serde(rename = "Error", default)]
    pub error: String,
    #[serde(rename = "Kind", default)]
    pub kind: ErrorKind,
}

impl TaskError {
    /// Build a record for `task` from a gateway error
    pub fn from_error(task: Task, err: &GatewayError) -> Self {
        Self {
            task,
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

/// A partner (or our own) organization and the sources it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Organization {
    pub name: String,
    /// Task-receiving endpoint
    pub uri: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// A statically configured user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub name: String,
    /// PHC-formatted Argon2 digest
    pub password_hash: String,
    pub id: i64,
}
