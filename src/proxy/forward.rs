use bytes::Bytes;
use hyper::header::{self, HeaderMap, HeaderName};
use hyper::{Method, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::types::{GatewayError, Result};

/// Headers that describe one connection and are never forwarded
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
    header::CONTENT_LENGTH,
];

/// Strip hop-by-hop headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    let mut kept = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(name)
            || name.as_str() == "keep-alive"
            || named.iter().any(|n| n == name.as_str())
        {
            continue;
        }
        kept.append(name.clone(), value.clone());
    }
    kept
}

/// A request held entirely in memory
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    /// Set a query parameter, replacing every existing value of that name
    pub fn set_query_param(&mut self, name: &str, value: &str) {
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(key, _)| key != name)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        let mut pairs = self.url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept);
        pairs.append_pair(name, value);
    }
}

/// A response held entirely in memory
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Plain relay of buffered requests
#[derive(Clone)]
pub struct ForwardProxy {
    client: reqwest::Client,
}

impl ForwardProxy {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Couldn't build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Send `request` upstream and buffer the reply
    pub async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse> {
        debug!(method = %request.method, url = %request.url, "Forwarding");

        let response = self
            .client
            .request(request.method, request.url)
            .headers(strip_hop_by_hop(&request.headers))
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response.bytes().await?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}
