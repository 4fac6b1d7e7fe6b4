//! Task submission endpoint (`/task/`)
//!
//! Reads the `task`, `username` and `password` form fields. Each per-task
//! error is written as one JSON object followed by a blank line. Failures
//! of the whole batch (bad credentials, unparsable tasks) answer 500 with
//! the error text.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap};
use hyper::{Response, StatusCode};
use tracing::{debug, error, warn};

use crate::dispatch::TaskService;
use crate::types::FormFields;

pub async fn handle_task(
    service: &TaskService,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let fields = FormFields::parse(query, content_type, body);

    match service
        .handle_task(fields.get("task"), fields.get("username"), fields.get("password"))
        .await
    {
        Ok(errors) => {
            debug!(errors = errors.len(), "Task batch handled");
            let mut out = Vec::new();
            for err in &errors {
                match serde_json::to_vec(err) {
                    Ok(json) => {
                        out.extend_from_slice(&json);
                        out.extend_from_slice(b"\n\n");
                    }
                    Err(e) => error!(error = %e, "Couldn't serialize task error"),
                }
            }

            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/x-ndjson")
                .header("Access-Control-Allow-Origin", "*")
                .body(Full::new(Bytes::from(out)))
                .unwrap()
        }
        Err(e) => {
            warn!(error = %e, "Task batch rejected");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Content-Type", "text/plain; charset=utf-8")
                .header("Access-Control-Allow-Origin", "*")
                .body(Full::new(Bytes::from(e.to_string())))
                .unwrap()
        }
    }
}
