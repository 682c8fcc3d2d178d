use async_trait::async_trait;

/// Produces a fresh batch of items for a cache
///
/// `None` entries mark candidates that failed source-specific validation
/// (broken image, incomplete feed entry). The cache drops them, so fetchers
/// don't have to compact the batch themselves. Capping the batch size is
/// the fetcher's job too.
#[async_trait]
pub trait BatchFetcher<T: Send + 'static>: Send + Sync {
    async fn fetch_batch(&self) -> anyhow::Result<Vec<Option<T>>>;
}
