//! Storage upload interception
//!
//! Requests are authenticated from their form fields and tagged with the
//! caller's `user_id`. When storage reports a successful upload and automatic
//! analyzers are configured, one task for the new object is sent to our own
//! organization in the background.

use hyper::header;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use super::forward::{ProxyRequest, ProxyResponse};
use super::interceptor::{InterceptContext, Interceptor};
use crate::dispatch::TaskService;
use crate::types::records::null_as_default;
use crate::types::{FormFields, Result, Task};

/// `ResponseCode` storage uses for success
pub const STORAGE_SUCCESS: i64 = 1;

/// Storage reply to an upload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StorageReply {
    pub response_code: i64,
    pub failure: String,
    pub result: StorageResult,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StorageResult {
    pub sha256: String,
    pub sha1: String,
    pub md5: String,
    pub mime: String,
    #[serde(deserialize_with = "null_as_default")]
    pub source: Vec<String>,
    #[serde(alias = "obj_name", alias = "ObjName", deserialize_with = "null_as_default")]
    pub objname: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub submissions: Vec<String>,
}

/// Authenticates uploads and triggers automatic analysis
pub struct SampleInterceptor {
    tasks: TaskService,
    auto_tasks: BTreeMap<String, Vec<String>>,
    retrieval_base: String,
}

impl SampleInterceptor {
    pub fn new(
        tasks: TaskService,
        auto_tasks: BTreeMap<String, Vec<String>>,
        retrieval_base: impl Into<String>,
    ) -> Self {
        Self {
            tasks,
            auto_tasks,
            retrieval_base: retrieval_base.into(),
        }
    }

    /// The automatic task for a storage reply, if one is due
    pub fn auto_task(&self, reply: &StorageReply, fields: &FormFields) -> Option<Task> {
        if reply.response_code != STORAGE_SUCCESS || self.auto_tasks.is_empty() {
            return None;
        }
        Some(Task {
            primary_uri: format!("{}{}", self.retrieval_base, reply.result.sha256),
            secondary_uri: String::new(),
            filename: fields.get("name").to_string(),
            tasks: self.auto_tasks.clone(),
            tags: Vec::new(),
            attempts: 0,
            source: fields.get("source").to_string(),
            download: true,
        })
    }
}

#[async_trait::async_trait]
impl Interceptor for SampleInterceptor {
    async fn on_request(
        &self,
        request: &mut ProxyRequest,
        context: &mut InterceptContext,
    ) -> Result<()> {
        let content_type = request
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let fields = FormFields::parse(request.url.query(), content_type, &request.body);

        let user = self
            .tasks
            .users()
            .authenticate(fields.get("username"), fields.get("password"))?
            .clone();

        request.set_query_param("user_id", &user.id.to_string());
        context.fields = fields;
        context.user = Some(user);
        Ok(())
    }

    async fn on_response(&self, response: &ProxyResponse, context: &InterceptContext) {
        let reply: StorageReply = match serde_json::from_slice(&response.body) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(status = %response.status, error = %e, "Storage reply is not an upload result");
                return;
            }
        };

        if reply.response_code != STORAGE_SUCCESS {
            debug!(code = reply.response_code, failure = %reply.failure, "Upload not stored");
            return;
        }
        info!(sha256 = %reply.result.sha256, "Sample uploaded");

        let Some(task) = self.auto_task(&reply, &context.fields) else {
            return;
        };

        info!(
            organization = %self.tasks.router().own().name,
            uri = %task.primary_uri,
            source = %task.source,
            "Automatically executing tasks"
        );
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            match tasks.dispatch_own(vec![task]).await {
                Ok(errors) => {
                    for err in errors {
                        warn!(uri = %err.task.primary_uri, error = %err.error, "Auto-task rejected");
                    }
                }
                Err(e) => error!(error = %e, "Auto-task dispatch failed"),
            }
        });
    }
}
