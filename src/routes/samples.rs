//! Sample proxy endpoint (`/samples/...`)

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Method, Response, Uri};
use tracing::warn;
use url::Url;

use crate::proxy::{InterceptingProxy, ProxyRequest};
use crate::types::{GatewayError, Result};

const PREFIX: &str = "/samples";

/// Storage URL for a `/samples/...` request: the path after the prefix is
/// appended to the storage base and the query string is kept
pub fn storage_target(base: &Url, uri: &Uri) -> Result<Url> {
    let rest = uri
        .path()
        .strip_prefix(PREFIX)
        .unwrap_or("")
        .trim_start_matches('/');

    let mut target = if rest.is_empty() {
        base.clone()
    } else {
        let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), rest);
        Url::parse(&joined)
            .map_err(|e| GatewayError::BadRequest(format!("Invalid sample path: {e}")))?
    };
    target.set_query(uri.query());
    Ok(target)
}

pub async fn handle_samples(
    proxy: &InterceptingProxy,
    storage: &Url,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let result = match storage_target(storage, uri) {
        Ok(url) => {
            proxy
                .round_trip(ProxyRequest {
                    method,
                    url,
                    headers,
                    body,
                })
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(upstream) => {
            let mut response = Response::builder()
                .status(upstream.status)
                .body(Full::new(upstream.body))
                .unwrap();
            *response.headers_mut() = upstream.headers;
            response
                .headers_mut()
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            response
        }
        Err(e) => {
            warn!(path = %uri.path(), error = %e, "Sample request failed");
            Response::builder()
                .status(e.status_code())
                .header("Content-Type", "text/plain; charset=utf-8")
                .header("Access-Control-Allow-Origin", "*")
                .body(Full::new(Bytes::from(e.to_string())))
                .unwrap()
        }
    }
}
