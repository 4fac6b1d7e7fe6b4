//! End-to-end federation tests
//!
//! Partner organizations and the storage service are real hyper servers on
//! 127.0.0.1:0. Partners open each ticket with their private key, verify the
//! gateway signature and answer with an encrypted error list.

use bytes::Bytes;
use chrono::Utc;
use ed25519_dalek::{SigningKey, VerifyingKey};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use rand::rngs::OsRng;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use taskgate::auth::hash_password;
use taskgate::config::GatewayConfig;
use taskgate::keys::{load_initial, DirectoryWatcher, KeyStore, SigningIdentity};
use taskgate::server::{route_request, AppState};
use taskgate::ticket::{open_envelope, seal_response, EncryptedEnvelope, Ticket};
use taskgate::types::{ErrorKind, Task, TaskError};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use x25519_dalek::{PublicKey, StaticSecret};

/// What a partner saw: its name, the key fingerprint and the verified ticket
type Received = (String, String, Ticket);

async fn spawn_server<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler(req).await) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    addr
}

/// A partner endpoint answering one error record per received task
async fn spawn_partner(
    name: &str,
    secret: StaticSecret,
    gateway_key: VerifyingKey,
    seen: mpsc::UnboundedSender<Received>,
) -> SocketAddr {
    let name = name.to_string();
    spawn_server(move |req: Request<Incoming>| {
        let name = name.clone();
        let secret = secret.clone();
        let seen = seen.clone();
        async move {
            let envelope = EncryptedEnvelope::from_query(req.uri().query().unwrap_or("")).unwrap();
            let (ticket_bytes, secrets) = open_envelope(&envelope, &secret).unwrap();
            let ticket = Ticket::verify(&ticket_bytes, &gateway_key, Utc::now()).unwrap();

            let errors: Vec<TaskError> = ticket
                .tasks
                .iter()
                .map(|task| TaskError {
                    task: task.clone(),
                    error: format!("queued at {name}"),
                    kind: ErrorKind::Remote,
                })
                .collect();
            seen.send((name, envelope.key_fingerprint, ticket)).unwrap();

            let body = seal_response(&serde_json::to_vec(&errors).unwrap(), &secrets).unwrap();
            Response::new(Full::new(Bytes::from(body)))
        }
    })
    .await
}

/// How a misbehaving partner answers a ticket it accepted
#[derive(Clone, Copy)]
enum BadReply {
    /// Sealed correctly, but the plaintext is not an error list
    SealedGarbage,
    /// Not encrypted at all
    Plaintext,
}

async fn spawn_bad_partner(secret: StaticSecret, reply: BadReply) -> SocketAddr {
    spawn_server(move |req: Request<Incoming>| {
        let secret = secret.clone();
        async move {
            let envelope = EncryptedEnvelope::from_query(req.uri().query().unwrap_or("")).unwrap();
            let (_, secrets) = open_envelope(&envelope, &secret).unwrap();
            let body = match reply {
                BadReply::SealedGarbage => seal_response(b"<html>busy</html>", &secrets).unwrap(),
                BadReply::Plaintext => b"[]".to_vec(),
            };
            Response::new(Full::new(Bytes::from(body)))
        }
    })
    .await
}

/// Storage endpoint: records the query it was called with, reports success
async fn spawn_storage(sha256: &'static str, calls: mpsc::UnboundedSender<String>) -> SocketAddr {
    spawn_server(move |req: Request<Incoming>| {
        let calls = calls.clone();
        async move {
            calls
                .send(format!("{}?{}", req.uri().path(), req.uri().query().unwrap_or("")))
                .unwrap();
            let _ = req.into_body().collect().await;
            let body = serde_json::json!({
                "ResponseCode": 1,
                "Failure": "",
                "Result": {"Sha256": sha256, "Sha1": "", "Md5": "", "Mime": "application/x-dosexec",
                           "Source": ["foo"], "Objname": ["evil.exe"], "Submissions": []}
            });
            Response::builder()
                .header("Content-Type", "application/json")
                .body(Full::new(Bytes::from(body.to_string())))
                .unwrap()
        }
    })
    .await
}

fn write_partner_key(dir: &Path, fingerprint: &str) -> StaticSecret {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    std::fs::write(dir.join(format!("{fingerprint}.pub")), hex::encode(public.as_bytes())).unwrap();
    secret
}

struct Gateway {
    state: AppState,
    _keys_dir: TempDir,
}

async fn gateway(
    organizations: serde_json::Value,
    own: &str,
    storage: &str,
    auto_tasks: serde_json::Value,
    keys_dir: TempDir,
    identity: SigningIdentity,
) -> Gateway {
    let config = serde_json::json!({
        "HTTP": "127.0.0.1:0",
        "SourcesKeysPath": keys_dir.path(),
        "TicketSignKeyPath": "/unused/sign.key",
        "Organizations": organizations,
        "OwnOrganization": own,
        "StorageURI": storage,
        "StorageRetrievalURI": "https://storage.example/download/",
        "AutoTasks": auto_tasks,
        "CertificatePath": "/unused/cert.pem",
        "CertificateKeyPath": "/unused/key.pem",
        "AllowedUsers": [
            {"Name": "alice", "PasswordHash": hash_password("secret").unwrap(), "Id": 42}
        ]
    });
    let config = GatewayConfig::from_json(&config.to_string()).unwrap();
    config.validate().unwrap();

    let keys = Arc::new(KeyStore::new());
    let mut watcher = DirectoryWatcher::new(keys_dir.path(), ".pub", Duration::from_millis(50));
    load_initial(&keys, &mut watcher).await;

    let state = AppState::new(config, None, identity, keys, Duration::from_secs(5)).unwrap();
    Gateway {
        state,
        _keys_dir: keys_dir,
    }
}

fn form_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers
}

fn task_form(tasks: &[Task]) -> Bytes {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("task", &serde_json::to_string(tasks).unwrap())
        .append_pair("username", "alice")
        .append_pair("password", "secret")
        .finish();
    Bytes::from(body)
}

fn task(uri: &str, source: &str) -> Task {
    Task {
        primary_uri: uri.to_string(),
        source: source.to_string(),
        ..Default::default()
    }
}

async fn submit(state: &AppState, tasks: &[Task]) -> (StatusCode, HeaderMap, Vec<TaskError>) {
    let uri: Uri = "/task/".parse().unwrap();
    let response = route_request(state, Method::POST, &uri, form_headers(), task_form(tasks)).await;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();

    let text = String::from_utf8(body.to_vec()).unwrap();
    let records = text
        .split("\n\n")
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| serde_json::from_str(chunk).unwrap())
        .collect();
    (status, headers, records)
}

#[tokio::test]
async fn test_missing_partner_key_is_reported_per_task() {
    let keys_dir = TempDir::new().unwrap();
    let identity = SigningIdentity::new("gateway", SigningKey::generate(&mut OsRng));
    let gw = gateway(
        serde_json::json!([{"Name": "Org1", "Uri": "http://127.0.0.1:9/task", "Sources": ["foo"]}]),
        "Org1",
        "http://127.0.0.1:9/",
        serde_json::json!({}),
        keys_dir,
        identity,
    )
    .await;

    let (status, headers, records) = submit(&gw.state, &[task("http://x/1", "foo")]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ErrorKind::KeyNotFound);
    assert_eq!(records[0].task.primary_uri, "http://x/1");
}

#[tokio::test]
async fn test_bad_credentials_fail_whole_batch() {
    let keys_dir = TempDir::new().unwrap();
    let identity = SigningIdentity::new("gateway", SigningKey::generate(&mut OsRng));
    let gw = gateway(
        serde_json::json!([{"Name": "Org1", "Uri": "http://127.0.0.1:9/task", "Sources": ["foo"]}]),
        "Org1",
        "http://127.0.0.1:9/",
        serde_json::json!({}),
        keys_dir,
        identity,
    )
    .await;

    let uri: Uri = "/task/?username=alice&password=wrong&task=%5B%5D".parse().unwrap();
    let response = route_request(&gw.state, Method::GET, &uri, HeaderMap::new(), Bytes::new()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers().get("Access-Control-Allow-Origin").unwrap(), "*");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Authentication failed");
}

#[tokio::test]
async fn test_two_organizations_get_separate_tickets() {
    let keys_dir = TempDir::new().unwrap();
    let foo_secret = write_partner_key(keys_dir.path(), "foo");
    let bar_secret = write_partner_key(keys_dir.path(), "bar");
    let signing = SigningKey::generate(&mut OsRng);
    let verifying = signing.verifying_key();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let org1 = spawn_partner("Org1", foo_secret, verifying, tx.clone()).await;
    let org2 = spawn_partner("Org2", bar_secret, verifying, tx).await;

    let gw = gateway(
        serde_json::json!([
            {"Name": "Org1", "Uri": format!("http://{org1}/task"), "Sources": ["foo"]},
            {"Name": "Org2", "Uri": format!("http://{org2}/task"), "Sources": ["bar"]}
        ]),
        "Org1",
        "http://127.0.0.1:9/",
        serde_json::json!({}),
        keys_dir,
        SigningIdentity::new("gateway", signing),
    )
    .await;

    let batch = [
        task("http://x/1", "bar"),
        task("http://x/2", "foo"),
        task("http://x/3", "nowhere"),
        task("http://x/4", "bar"),
    ];
    let (status, _, records) = submit(&gw.state, &batch).await;
    assert_eq!(status, StatusCode::OK);

    // Org2 owns the first task, so its group is formed and sent first.
    let (first_org, first_fp, first_ticket) = rx.recv().await.unwrap();
    let (second_org, second_fp, second_ticket) = rx.recv().await.unwrap();
    assert!(rx.try_recv().is_err());

    assert_eq!((first_org.as_str(), first_fp.as_str()), ("Org2", "bar"));
    assert_eq!((second_org.as_str(), second_fp.as_str()), ("Org1", "foo"));
    let uris = |ticket: &Ticket| ticket.tasks.iter().map(|t| t.primary_uri.clone()).collect::<Vec<_>>();
    assert_eq!(uris(&first_ticket), vec!["http://x/1", "http://x/4"]);
    assert_eq!(uris(&second_ticket), vec!["http://x/2"]);
    assert_eq!(first_ticket.signer_key_id, "gateway");

    // Unrouted first, then each organization in dispatch order.
    let summary: Vec<(String, ErrorKind)> = records
        .iter()
        .map(|r| (r.task.primary_uri.clone(), r.kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("http://x/3".to_string(), ErrorKind::NoRoute),
            ("http://x/1".to_string(), ErrorKind::Remote),
            ("http://x/4".to_string(), ErrorKind::Remote),
            ("http://x/2".to_string(), ErrorKind::Remote),
        ]
    );
    assert_eq!(records[1].error, "queued at Org2");
    assert_eq!(records[3].error, "queued at Org1");
}

#[tokio::test]
async fn test_partner_outage_only_affects_its_tasks() {
    let keys_dir = TempDir::new().unwrap();
    let foo_secret = write_partner_key(keys_dir.path(), "foo");
    write_partner_key(keys_dir.path(), "bar");
    let signing = SigningKey::generate(&mut OsRng);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let org1 = spawn_partner("Org1", foo_secret, signing.verifying_key(), tx).await;

    // Bind and drop a listener to get a port nobody answers on.
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let gw = gateway(
        serde_json::json!([
            {"Name": "Org1", "Uri": format!("http://{org1}/task"), "Sources": ["foo"]},
            {"Name": "Org2", "Uri": format!("http://{dead}/task"), "Sources": ["bar"]}
        ]),
        "Org1",
        "http://127.0.0.1:9/",
        serde_json::json!({}),
        keys_dir,
        SigningIdentity::new("gateway", signing),
    )
    .await;

    let (status, _, records) =
        submit(&gw.state, &[task("http://x/1", "bar"), task("http://x/2", "foo")]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, ErrorKind::Transport);
    assert_eq!(records[0].task.primary_uri, "http://x/1");
    assert_eq!(records[1].kind, ErrorKind::Remote);
    assert_eq!(rx.recv().await.unwrap().0, "Org1");
}

#[tokio::test]
async fn test_upload_triggers_one_auto_task_to_own_organization() {
    let keys_dir = TempDir::new().unwrap();
    let foo_secret = write_partner_key(keys_dir.path(), "foo");
    let signing = SigningKey::generate(&mut OsRng);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let home = spawn_partner("Home", foo_secret, signing.verifying_key(), tx).await;
    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let storage = spawn_storage("deadbeef", calls_tx).await;

    let gw = gateway(
        serde_json::json!([
            {"Name": "Home", "Uri": format!("http://{home}/task"), "Sources": ["foo"]},
            {"Name": "Other", "Uri": "http://127.0.0.1:9/task", "Sources": ["bar"]}
        ]),
        "Home",
        &format!("http://{storage}/"),
        serde_json::json!({"yara": [], "pe": ["--verbose"]}),
        keys_dir,
        SigningIdentity::new("gateway", signing),
    )
    .await;

    let uri: Uri = "/samples/api/objects/upload?user_id=1".parse().unwrap();
    let body = Bytes::from_static(b"name=evil.exe&source=foo&username=alice&password=secret");
    let response = route_request(&gw.state, Method::POST, &uri, form_headers(), body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let reply = response.into_body().collect().await.unwrap().to_bytes();
    let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(reply["Result"]["Sha256"], "deadbeef");

    // Storage saw the authenticated id, not the client-supplied one.
    assert_eq!(calls.recv().await.unwrap(), "/api/objects/upload?user_id=42");

    let (org, fingerprint, ticket) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(org, "Home");
    assert_eq!(fingerprint, "foo");
    assert_eq!(ticket.tasks.len(), 1);
    let auto = &ticket.tasks[0];
    assert_eq!(auto.primary_uri, "https://storage.example/download/deadbeef");
    assert_eq!(auto.source, "foo");
    assert_eq!(auto.filename, "evil.exe");
    assert!(auto.download);
    assert_eq!(auto.tasks.get("pe").unwrap(), &vec!["--verbose".to_string()]);

    assert!(tokio::time::timeout(Duration::from_millis(300), rx.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_upload_with_bad_credentials_is_not_forwarded() {
    let keys_dir = TempDir::new().unwrap();
    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let storage = spawn_storage("deadbeef", calls_tx).await;

    let gw = gateway(
        serde_json::json!([{"Name": "Home", "Uri": "http://127.0.0.1:9/task", "Sources": ["foo"]}]),
        "Home",
        &format!("http://{storage}/"),
        serde_json::json!({"yara": []}),
        keys_dir,
        SigningIdentity::new("gateway", SigningKey::generate(&mut OsRng)),
    )
    .await;

    let uri: Uri = "/samples/api/objects/upload".parse().unwrap();
    let body = Bytes::from_static(b"name=evil.exe&source=foo&username=mallory&password=secret");
    let response = route_request(&gw.state, Method::POST, &uri, form_headers(), body).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(calls.try_recv().is_err());
}

async fn undecodable_reply_case(reply: BadReply) {
    let keys_dir = TempDir::new().unwrap();
    let foo_secret = write_partner_key(keys_dir.path(), "foo");
    let bar_secret = write_partner_key(keys_dir.path(), "bar");
    let signing = SigningKey::generate(&mut OsRng);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let org1 = spawn_partner("Org1", foo_secret, signing.verifying_key(), tx).await;
    let org2 = spawn_bad_partner(bar_secret, reply).await;

    let gw = gateway(
        serde_json::json!([
            {"Name": "Org1", "Uri": format!("http://{org1}/task"), "Sources": ["foo"]},
            {"Name": "Org2", "Uri": format!("http://{org2}/task"), "Sources": ["bar"]}
        ]),
        "Org1",
        "http://127.0.0.1:9/",
        serde_json::json!({}),
        keys_dir,
        SigningIdentity::new("gateway", signing),
    )
    .await;

    let batch = [
        task("http://x/1", "bar"),
        task("http://x/2", "foo"),
        task("http://x/3", "bar"),
    ];
    let (status, _, records) = submit(&gw.state, &batch).await;

    assert_eq!(status, StatusCode::OK);
    let summary: Vec<(String, ErrorKind)> = records
        .iter()
        .map(|r| (r.task.primary_uri.clone(), r.kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("http://x/1".to_string(), ErrorKind::Decode),
            ("http://x/3".to_string(), ErrorKind::Decode),
            ("http://x/2".to_string(), ErrorKind::Remote),
        ]
    );
    assert_eq!(records[2].error, "queued at Org1");
    assert_eq!(rx.recv().await.unwrap().0, "Org1");
}

#[tokio::test]
async fn test_sealed_non_json_reply_becomes_decode_records() {
    undecodable_reply_case(BadReply::SealedGarbage).await;
}

#[tokio::test]
async fn test_unencrypted_reply_becomes_decode_records() {
    undecodable_reply_case(BadReply::Plaintext).await;
}

#[tokio::test]
async fn test_options_on_samples_reaches_storage() {
    let keys_dir = TempDir::new().unwrap();
    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let storage = spawn_storage("deadbeef", calls_tx).await;

    let gw = gateway(
        serde_json::json!([{"Name": "Home", "Uri": "http://127.0.0.1:9/task", "Sources": ["foo"]}]),
        "Home",
        &format!("http://{storage}/"),
        serde_json::json!({}),
        keys_dir,
        SigningIdentity::new("gateway", SigningKey::generate(&mut OsRng)),
    )
    .await;

    let uri: Uri = "/samples/api/objects/upload?username=alice&password=secret"
        .parse()
        .unwrap();
    let response = route_request(&gw.state, Method::OPTIONS, &uri, HeaderMap::new(), Bytes::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("Access-Control-Allow-Methods").is_none());
    let reply = response.into_body().collect().await.unwrap().to_bytes();
    let reply: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(reply["Result"]["Sha256"], "deadbeef");
    assert_eq!(
        calls.recv().await.unwrap(),
        "/api/objects/upload?username=alice&password=secret&user_id=42"
    );

    // Elsewhere OPTIONS is still a local preflight.
    let uri: Uri = "/task/".parse().unwrap();
    let response = route_request(&gw.state, Method::OPTIONS, &uri, HeaderMap::new(), Bytes::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("Access-Control-Allow-Methods").is_some());
    assert!(calls.try_recv().is_err());
}
