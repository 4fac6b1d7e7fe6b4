//! Reverse proxy to the object storage service
//!
//! [`ForwardProxy`] relays fully buffered requests. [`InterceptingProxy`]
//! runs [`Interceptor`] hooks around it: `on_request` may rewrite or refuse
//! a request before anything is forwarded, `on_response` inspects the reply.

mod forward;
mod interceptor;
mod samples;

pub use forward::{ForwardProxy, ProxyRequest, ProxyResponse};
pub use interceptor::{InterceptContext, InterceptingProxy, Interceptor};
pub use samples::{StorageReply, StorageResult, SampleInterceptor};
