use std::sync::Arc;
use tracing::warn;

use super::forward::{ForwardProxy, ProxyRequest, ProxyResponse};
use crate::types::{FormFields, Result, User};

/// State carried from a request hook to the matching response hook
#[derive(Debug, Clone, Default)]
pub struct InterceptContext {
    /// Form fields read from the inbound request
    pub fields: FormFields,
    /// Set once a hook has authenticated the caller
    pub user: Option<User>,
}

/// Hooks around one proxied round trip
#[async_trait::async_trait]
pub trait Interceptor: Send + Sync {
    /// Inspect or rewrite the outgoing request. An error aborts the round
    /// trip before anything is forwarded.
    async fn on_request(
        &self,
        request: &mut ProxyRequest,
        context: &mut InterceptContext,
    ) -> Result<()>;

    /// Inspect the upstream reply. Cannot fail the round trip.
    async fn on_response(&self, response: &ProxyResponse, context: &InterceptContext);
}

/// A [`ForwardProxy`] wrapped in a chain of interceptors
#[derive(Clone)]
pub struct InterceptingProxy {
    forward: ForwardProxy,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptingProxy {
    pub fn new(forward: ForwardProxy) -> Self {
        Self {
            forward,
            interceptors: Vec::new(),
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Request hooks in order, forward, then response hooks in order
    pub async fn round_trip(&self, mut request: ProxyRequest) -> Result<ProxyResponse> {
        let mut context = InterceptContext::default();
        for interceptor in &self.interceptors {
            if let Err(e) = interceptor.on_request(&mut request, &mut context).await {
                warn!(url = %request.url, error = %e, "Proxy request refused");
                return Err(e);
            }
        }

        let response = self.forward.forward(request).await?;

        for interceptor in &self.interceptors {
            interceptor.on_response(&response, &context).await;
        }
        Ok(response)
    }
}
