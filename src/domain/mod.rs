// Domain types and value objects
pub mod option;
pub mod ticker;

// Re-export commonly used types
pub use option::{BarrierDirection, BarrierKind, BarrierStyle, Contract, OptionKind};
pub use ticker::normalize_ticker;
