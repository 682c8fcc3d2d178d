// In-memory refresh cache
// Serves random items from a small working set while fresh batches load in the background

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod policy;

pub use cache::{CacheOptions, CacheStats, RefreshCache, RefreshOutcome};
pub use error::CacheError;
pub use fetcher::BatchFetcher;
pub use policy::{HitThreshold, RefreshPolicy};

/// Result alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
