// Collaborators: document, blob and market-data stores, the task queue,
// and the path artifact codec built on the blob store
pub mod artifacts;
pub mod blob;
pub mod demo_market;
pub mod market_data;
pub mod queue;
pub mod store;

// Re-export commonly used types
pub use artifacts::PathArtifactStore;
pub use blob::{BlobId, BlobStore, FsBlobStore, MemoryBlobStore};
pub use demo_market::demo_market;
pub use market_data::{CachedMarketData, MarketDataProvider, StaticMarketData};
pub use queue::{ChannelQueue, TaskQueue};
pub use store::{DocumentStore, Filter, MemoryDocumentStore, Sort};
