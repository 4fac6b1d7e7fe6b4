//! Source-based routing of tasks to organizations

mod router;

pub use router::{Partition, SourceRouter};
