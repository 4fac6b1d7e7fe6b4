//! Shared types: the gateway error, the task/organization records and form
//! field extraction

pub mod error;
pub mod form;
pub mod records;

pub use error::{ErrorKind, GatewayError, Result};
pub use form::FormFields;
pub use records::{Organization, Task, TaskError, User};
