// Records and value types shared by the engines and the stores

pub mod artifact;
pub mod job;
pub mod market;
pub mod params;

// Re-export key types for convenience
pub use artifact::{PathMatrix, PathSubset, PathsHandle};
pub use job::{Job, JobRequest, JobStats, JobStatus, JobType};
pub use market::{MarketSnapshot, OptionChain, OptionChainRow, SpotQuote};
pub use params::JobSpec;
