//! HTTP route handlers
//!
//! Handlers take already-collected request parts so they can be exercised
//! without a listener.

pub mod health;
pub mod samples;
pub mod task;

pub use health::{health_check, version_info};
pub use samples::{handle_samples, storage_target};
pub use task::handle_task;
