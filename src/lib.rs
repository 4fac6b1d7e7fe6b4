//! taskgate - federation gateway for analysis tasks
//!
//! Accepts task batches from authenticated clients, works out which partner
//! organization owns each task's source, and hands every organization its
//! tasks inside a signed, encrypted ticket. Also fronts the object storage
//! service, tagging uploads with the caller's identity and queueing
//! automatic analysis of each new object.
//!
//! ## Components
//!
//! - **Keys**: partner public keys, hot-reloaded from a watched directory
//! - **Ticket**: signing, verification and hybrid encryption of task batches
//! - **Routing**: source -> organization index and batch partitioning
//! - **Dispatch**: per-organization round trips and error aggregation
//! - **Proxy**: storage reverse proxy with request/response interceptors

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod keys;
pub mod proxy;
pub mod routes;
pub mod routing;
pub mod server;
pub mod ticket;
pub mod types;

pub use config::{Args, GatewayConfig};
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
