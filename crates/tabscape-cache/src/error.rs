use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by a [`RefreshCache`](crate::RefreshCache)
///
/// Invalid entries inside a batch are not errors; they are filtered out
/// before the batch is stored.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Batch fetch failed: {0:#}")]
    FetchFailed(anyhow::Error),

    #[error("No item became available within {0:?}")]
    ReadTimeout(Duration),

    #[error("Cache was shut down before an item became available")]
    Closed,
}

impl CacheError {
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, CacheError::FetchFailed(_))
    }
}
