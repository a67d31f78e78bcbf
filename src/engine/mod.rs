pub mod core;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod worker;

// Re-export key components
pub use core::QuantEngine;
pub use dispatch::Dispatcher;
pub use error::{JobError, JobResult};
pub use lifecycle::{JobManager, JobUpdate};
pub use messages::JobTask;
