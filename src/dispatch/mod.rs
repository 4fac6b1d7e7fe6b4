//! Task fan-out to partner organizations
//!
//! - [`Dispatcher`]: one encrypted ticket round trip per organization
//! - [`TaskService`]: authenticate, partition, dispatch and aggregate

mod dispatcher;
mod service;

pub use dispatcher::Dispatcher;
pub use service::TaskService;
