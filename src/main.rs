//! taskgate - federation gateway for analysis tasks

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskgate::{
    config::{Args, GatewayConfig},
    keys::{load_initial, spawn_key_sync, DirectoryWatcher, KeyStore, SigningIdentity},
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("taskgate={},info", args.log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = match GatewayConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  taskgate - federation task gateway");
    info!("======================================");
    info!("Listen: {}", args.listen.map(|a| a.to_string()).unwrap_or_else(|| config.http.clone()));
    info!("Own organization: {}", config.own_organization);
    for org in &config.organizations {
        info!("  {}: {} ({} sources)", org.name, org.uri, org.sources.len());
    }
    info!("Keys: {}", config.sources_keys_path.display());
    info!("Storage: {}", config.storage_uri);
    info!("Auto tasks: {}", config.auto_tasks.len());
    info!("Users: {}", config.allowed_users.len());
    info!("======================================");

    let identity = match SigningIdentity::load(&config.ticket_sign_key_path) {
        Ok(identity) => identity,
        Err(e) => {
            error!("Error while reading key for signing: {}", e);
            std::process::exit(1);
        }
    };
    info!("Signing tickets as {}", identity.key_id());

    let keys = Arc::new(KeyStore::new());
    let mut watcher = DirectoryWatcher::new(
        &config.sources_keys_path,
        &config.key_extension,
        args.key_poll_interval(),
    );
    load_initial(&keys, &mut watcher).await;

    let acceptor = server::load_tls_acceptor(&config.certificate_path, &config.certificate_key_path)?;

    let state = Arc::new(AppState::new(
        config,
        args.listen,
        identity,
        Arc::clone(&keys),
        args.request_timeout(),
    )?);

    spawn_key_sync(keys, watcher);

    server::run(state, acceptor).await?;
    Ok(())
}
