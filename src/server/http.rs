//! HTTP server implementation
//!
//! hyper http1 connections over TLS, one task per connection. Request
//! bodies are collected in full before routing.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::routes;
use crate::types::Result;

/// Accept TLS connections until the process exits
pub async fn run(state: Arc<AppState>, acceptor: TlsAcceptor) -> Result<()> {
    let listener = TcpListener::bind(state.listen).await?;

    info!("taskgate listening on https://{}", state.listen);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let stream = match acceptor.accept(stream).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            debug!("TLS handshake with {} failed: {}", addr, e);
                            return;
                        }
                    };
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    info!("[{}] {} {}", addr, parts.method, parts.uri.path());

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("[{}] Couldn't read request body: {}", addr, e);
            return Ok(text_response(StatusCode::BAD_REQUEST, "Couldn't read request body"));
        }
    };

    Ok(route_request(&state, parts.method, &parts.uri, parts.headers, body).await)
}

/// Route a fully read request
pub async fn route_request(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let path = uri.path();

    match (&method, path) {
        // Every method goes to storage, OPTIONS included
        (_, p) if p == "/samples" || p.starts_with("/samples/") => {
            routes::handle_samples(&state.proxy, &state.storage, method, uri, headers, body).await
        }

        // CORS preflight
        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, "/health") => routes::health_check(state.keys.len()),

        (&Method::GET, "/version") => routes::version_info(),

        (&Method::GET, "/task") | (&Method::GET, "/task/") | (&Method::POST, "/task")
        | (&Method::POST, "/task/") => {
            routes::handle_task(&state.tasks, uri.query(), &headers, &body).await
        }

        (_, "/task") | (_, "/task/") => {
            text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }

        _ => not_found_response(path),
    }
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(message.to_string())))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
