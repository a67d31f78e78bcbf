//! Configuration module for the quantitative job engine.

pub mod demo;
pub mod engine;
pub mod market;
pub mod optimization;
pub mod persistence;

mod debug; // Private: use crate::config::DEBUG_FLAGS, not crate::config::debug::DEBUG_FLAGS
pub use debug::DEBUG_FLAGS;

// Re-export commonly used items
pub use demo::DEMO;
pub use engine::{ENGINE, EngineSettings};
pub use market::MARKET;
pub use optimization::OPTIMIZATION;
pub use persistence::{PERSISTENCE, artifact_blob_name};
