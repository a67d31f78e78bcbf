// Cross-cutting helpers: numeric sanitization, timestamps, small linear algebra
pub mod maths_utils;
pub mod sanitize;
pub mod time_utils;

// Re-export commonly used items
pub use sanitize::{Payload, sanitize};
pub use time_utils::TimeUtils;
