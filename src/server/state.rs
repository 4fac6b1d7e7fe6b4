//! Application context built once at startup

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::auth::UserStore;
use crate::config::GatewayConfig;
use crate::dispatch::{Dispatcher, TaskService};
use crate::keys::{KeyStore, SigningIdentity};
use crate::proxy::{ForwardProxy, InterceptingProxy, SampleInterceptor};
use crate::routing::SourceRouter;
use crate::ticket::TicketCodec;
use crate::types::{GatewayError, Result};

/// Shared application state
///
/// Everything here is read-only after startup except the key store, which
/// the key sync task updates behind its own lock.
pub struct AppState {
    pub config: GatewayConfig,
    pub listen: SocketAddr,
    pub keys: Arc<KeyStore>,
    pub tasks: TaskService,
    pub proxy: InterceptingProxy,
    /// Parsed `StorageURI`
    pub storage: Url,
}

impl AppState {
    /// Wire every component from the loaded configuration
    ///
    /// `timeout` bounds all outbound calls to partners and storage.
    pub fn new(
        config: GatewayConfig,
        listen: Option<SocketAddr>,
        identity: SigningIdentity,
        keys: Arc<KeyStore>,
        timeout: Duration,
    ) -> Result<Self> {
        let listen = match listen {
            Some(addr) => addr,
            None => config.bind_addr()?,
        };
        let storage = Url::parse(&config.storage_uri).map_err(|e| {
            GatewayError::Config(format!("Invalid StorageURI {}: {}", config.storage_uri, e))
        })?;

        let users = Arc::new(UserStore::new(config.allowed_users.clone())?);
        let router = Arc::new(SourceRouter::new(
            config.organizations.clone(),
            &config.own_organization,
        )?);
        let codec = TicketCodec::new(Arc::new(identity), Arc::clone(&keys), config.ticket_validity());
        let tasks = TaskService::new(users, router, Dispatcher::new(codec, timeout)?);

        let interceptor = SampleInterceptor::new(
            tasks.clone(),
            config.auto_tasks.clone(),
            config.retrieval_base(),
        );
        let proxy = InterceptingProxy::new(ForwardProxy::new(timeout)?)
            .with_interceptor(Arc::new(interceptor));

        Ok(Self {
            config,
            listen,
            keys,
            tasks,
            proxy,
            storage,
        })
    }
}
